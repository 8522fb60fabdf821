//! Storage traits and error types
//!
//! This module defines the `Ledger` trait implemented by every backend, and the
//! error type shared by them. Backends only provide the raw namespace
//! primitives; admission, failure marking and the frontier reconstruction scan
//! are provided methods so that every backend follows the same rules.

use crate::state::{FailureReason, PageState};
use crate::storage::{FailureRecord, LedgerCounts, PageRecord, DOWNLOADED_MIN_BYTES};
use crate::url::url_hash;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid state transition for {hash}: {from} -> {to}")]
    InvalidTransition {
        hash: String,
        from: PageState,
        to: PageState,
    },

    #[error("Corrupt ledger entry {hash}: {message}")]
    Corrupt { hash: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Content-addressed record of URL fetch state for one domain
///
/// Three namespaces share the URL hash as key:
/// - Index: hash -> canonical URL, written once
/// - Content: hash -> rendered HTML, zero bytes meaning "registered, not fetched"
/// - Failure: hash -> `url|reason|timestamp`, presence meaning permanently failed
pub trait Ledger: Send {
    // ===== Index namespace =====

    /// Returns true if an Index entry exists for the hash
    fn has_index(&self, hash: &str) -> StorageResult<bool>;

    /// Writes the Index entry if it does not exist yet
    fn write_index(&mut self, hash: &str, url: &str) -> StorageResult<()>;

    /// Looks up the canonical URL registered for a hash
    fn lookup_url(&self, hash: &str) -> StorageResult<Option<String>>;

    // ===== Content namespace =====

    /// Creates the zero-size Pending sentinel if no content entry exists
    fn touch(&mut self, hash: &str) -> StorageResult<()>;

    /// Size in bytes of the content entry, None if there is no entry
    fn content_size(&self, hash: &str) -> StorageResult<Option<u64>>;

    /// Reads the content entry
    fn read_content(&self, hash: &str) -> StorageResult<Option<String>>;

    /// Replaces the content entry
    fn write_content(&mut self, hash: &str, body: &str) -> StorageResult<()>;

    /// All content hashes, oldest first
    fn content_hashes(&self) -> StorageResult<Vec<String>>;

    /// Moves a zero-size placeholder into the removed archive
    ///
    /// Returns true if a placeholder was archived.
    fn archive_placeholder(&mut self, hash: &str, timestamp: &str) -> StorageResult<bool>;

    // ===== Failure namespace =====

    /// Reads the failure record for a hash
    fn failure(&self, hash: &str) -> StorageResult<Option<FailureRecord>>;

    /// Writes the failure record for a hash
    fn write_failure(&mut self, hash: &str, record: &FailureRecord) -> StorageResult<()>;

    /// All hashes with a failure record
    fn failed_hashes(&self) -> StorageResult<Vec<String>>;

    // ===== Provided operations =====

    /// Returns true if rendered content is stored for the hash
    fn is_downloaded(&self, hash: &str) -> StorageResult<bool> {
        Ok(self
            .content_size(hash)?
            .is_some_and(|size| size > DOWNLOADED_MIN_BYTES))
    }

    /// Returns true if the hash is permanently failed
    fn is_failed(&self, hash: &str) -> StorageResult<bool> {
        Ok(self.failure(hash)?.is_some())
    }

    /// Admits a canonical URL into the ledger
    ///
    /// This is the only way new URLs enter the ledger. The Pending sentinel is
    /// written before the Index entry, so an interrupted admission is repaired
    /// by admitting the URL again.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The URL was new and is now Pending
    /// * `Ok(false)` - The URL was already registered, downloaded or failed
    fn register_url(&mut self, url: &str) -> StorageResult<bool> {
        let hash = url_hash(url);

        if self.is_failed(&hash)? || self.is_downloaded(&hash)? || self.has_index(&hash)? {
            return Ok(false);
        }

        self.touch(&hash)?;
        self.write_index(&hash, url)?;
        Ok(true)
    }

    /// Permanently marks a hash as failed
    ///
    /// The failure record carries the URL, the reason tag and a local timestamp.
    /// A zero-size placeholder is moved into the removed archive, never deleted.
    fn mark_failed(&mut self, hash: &str, url: &str, reason: &FailureReason) -> StorageResult<()> {
        if self.is_downloaded(hash)? {
            return Err(StorageError::InvalidTransition {
                hash: hash.to_string(),
                from: PageState::Downloaded,
                to: PageState::Failed,
            });
        }

        let record = FailureRecord::now(url, reason.clone());
        self.write_failure(hash, &record)?;

        if self.content_size(hash)? == Some(0) {
            self.archive_placeholder(hash, &record.timestamp)?;
        }

        Ok(())
    }

    /// Stores rendered HTML prefixed with a provenance comment
    fn store_content(&mut self, hash: &str, url: &str, html: &str) -> StorageResult<()> {
        if self.is_failed(hash)? {
            return Err(StorageError::InvalidTransition {
                hash: hash.to_string(),
                from: PageState::Failed,
                to: PageState::Downloaded,
            });
        }

        let body = format!("<!-- URL: {} -->\n{}", url, html);
        self.write_content(hash, &body)
    }

    /// Scans for entries waiting to be fetched
    ///
    /// Returns every (hash, url) whose content entry is the zero-size sentinel,
    /// that has an Index entry, and that has no failure record. This is the
    /// scan the frontier is rebuilt from.
    fn pending(&self) -> StorageResult<Vec<(String, String)>> {
        let mut pending = Vec::new();
        for hash in self.content_hashes()? {
            if self.content_size(&hash)? != Some(0) || self.is_failed(&hash)? {
                continue;
            }
            if let Some(url) = self.lookup_url(&hash)? {
                pending.push((hash, url));
            }
        }
        Ok(pending)
    }

    /// All hashes whose rendered content is stored
    fn downloaded(&self) -> StorageResult<Vec<String>> {
        let mut downloaded = Vec::new();
        for hash in self.content_hashes()? {
            if self.is_downloaded(&hash)? {
                downloaded.push(hash);
            }
        }
        Ok(downloaded)
    }

    /// Assembles the full record for a hash
    fn page(&self, hash: &str) -> StorageResult<Option<PageRecord>> {
        let failure = self.failure(hash)?;
        let url = match self.lookup_url(hash)? {
            Some(url) => url,
            None => match &failure {
                Some(record) => record.url.clone(),
                None => return Ok(None),
            },
        };

        let size_bytes = self.content_size(hash)?.unwrap_or(0);
        let state = if failure.is_some() {
            PageState::Failed
        } else if size_bytes > DOWNLOADED_MIN_BYTES {
            PageState::Downloaded
        } else {
            PageState::Pending
        };

        Ok(Some(PageRecord {
            hash: hash.to_string(),
            url,
            state,
            failure_reason: failure.map(|record| record.reason),
            size_bytes,
        }))
    }

    /// Counts entries by state
    fn counts(&self) -> StorageResult<LedgerCounts> {
        let mut counts = LedgerCounts::default();
        for hash in self.content_hashes()? {
            counts.total += 1;
            if self.is_failed(&hash)? {
                continue;
            }
            match self.content_size(&hash)? {
                Some(0) => counts.pending += 1,
                Some(size) if size > DOWNLOADED_MIN_BYTES => counts.downloaded += 1,
                _ => {}
            }
        }
        counts.failed = self.failed_hashes()?.len() as u64;
        Ok(counts)
    }
}
