//! URL handling module
//!
//! This module provides URL canonicalization, content-address hashing, crawl-scope
//! checks and include/exclude filtering.

mod domain;
mod matcher;
mod normalize;

use sha2::{Digest, Sha256};

// Re-export main functions
pub use domain::{extract_domain, is_same_domain, root_domain};
pub use matcher::{
    is_binary_target, matches_wildcard, UrlFilter, DEFAULT_EXCLUDE_PATTERNS,
    DEFAULT_INCLUDE_PATTERNS,
};
pub use normalize::normalize_url;

/// Computes the content address of a canonical URL
///
/// The address is the lowercase hex SHA-256 digest of the URL bytes. The same
/// canonical URL always yields the same address, which is what makes the
/// ledger deduplicate across restarts.
///
/// # Examples
///
/// ```
/// use study_crawl::url::url_hash;
///
/// let hash = url_hash("https://www.example.com/a");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, url_hash("https://www.example.com/a"));
/// ```
pub fn url_hash(canonical_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url.as_bytes());
    hex::encode(hasher.finalize())
}
