//! Link extraction and scoping
//!
//! Links come from two places:
//! - A regex scan of the raw HTML for `href="..."` / `href='...'`
//! - The anchor list the renderer reports for the live document
//!
//! Both go through the same pipeline before admission: resolve against the
//! page URL, canonicalize, keep same-domain hosts, apply include/exclude.

use crate::url::{extract_domain, is_same_domain, normalize_url, UrlFilter};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static HREF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href pattern is valid")
});

/// Schemes and prefixes that never lead to a crawlable page
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "#"];

/// Crawl scope of one domain: root, subdomain policy and URL filter
#[derive(Debug, Clone)]
pub struct LinkScope {
    root: String,
    allow_subdomains: bool,
    filter: UrlFilter,
}

impl LinkScope {
    /// Creates a scope for `root` (without `www.`)
    pub fn new(root: &str, allow_subdomains: bool, filter: UrlFilter) -> Self {
        Self {
            root: root.to_string(),
            allow_subdomains,
            filter,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn allow_subdomains(&self) -> bool {
        self.allow_subdomains
    }

    pub fn filter(&self) -> &UrlFilter {
        &self.filter
    }

    /// Canonical form of `https://<root>/`, the seed of an empty study
    pub fn root_url(&self) -> Option<String> {
        normalize_url(&format!("https://{}/", self.root), &self.root).ok()
    }

    /// Canonicalizes an absolute URL and checks it is in scope
    ///
    /// Returns None when the URL should be silently dropped.
    pub fn accept(&self, absolute_url: &str) -> Option<String> {
        let canonical = normalize_url(absolute_url, &self.root).ok()?;
        let parsed = Url::parse(&canonical).ok()?;
        let host = extract_domain(&parsed)?;

        if !is_same_domain(&host, &self.root, self.allow_subdomains) {
            return None;
        }

        if !self.filter.should_include(&canonical) {
            return None;
        }

        Some(canonical)
    }

    /// Resolves, canonicalizes and scopes a list of hrefs
    ///
    /// Duplicates are removed; first-seen order is kept.
    pub fn scope_links<I, S>(&self, hrefs: I, base_url: &Url) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for href in hrefs {
            let Some(absolute) = resolve_link(href.as_ref(), base_url) else {
                continue;
            };
            let Some(canonical) = self.accept(&absolute) else {
                continue;
            };
            if seen.insert(canonical.clone()) {
                links.push(canonical);
            }
        }

        links
    }
}

/// Finds every quoted `href` attribute value in raw HTML
///
/// # Example
///
/// ```
/// use study_crawl::crawler::extract_hrefs;
///
/// let hrefs = extract_hrefs(r#"<a href="/a">A</a><a href='/b'>B</a>"#);
/// assert_eq!(hrefs, vec!["/a", "/b"]);
/// ```
pub fn extract_hrefs(html: &str) -> Vec<String> {
    HREF_PATTERN
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Links found by scanning the raw HTML only
///
/// This is the strategy used when re-reading stored pages, where no live
/// document is available.
pub fn static_links(html: &str, base_url: &Url, scope: &LinkScope) -> Vec<String> {
    scope.scope_links(extract_hrefs(html), base_url)
}

/// Union of the static scan and the renderer's anchor list
pub fn collect_links(
    html: &str,
    rendered_links: &[String],
    base_url: &Url,
    scope: &LinkScope,
) -> Vec<String> {
    let hrefs = extract_hrefs(html);
    scope.scope_links(
        hrefs.iter().map(String::as_str).chain(rendered_links.iter().map(String::as_str)),
        base_url,
    )
}
