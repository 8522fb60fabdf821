use crate::url::matcher::matches_wildcard;
use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use study_crawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Derives the crawl root from a domain given on the command line
///
/// The root is lowercased and loses a leading `www.`, so `www.Example.com`
/// and `example.com` describe the same crawl.
pub fn root_domain(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('.').to_lowercase();
    match domain.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => domain,
    }
}

/// Checks whether a host belongs to the crawl scope of `root`
///
/// The root itself and its `www.` form are always in scope. With
/// `allow_subdomains`, any host ending in `.root` is accepted as well. This is a
/// crawl-scope boundary, not a security boundary.
///
/// # Examples
///
/// ```
/// use study_crawl::url::is_same_domain;
///
/// assert!(is_same_domain("www.example.com", "example.com", false));
/// assert!(!is_same_domain("docs.example.com", "example.com", false));
/// assert!(is_same_domain("docs.example.com", "example.com", true));
/// ```
pub fn is_same_domain(host: &str, root: &str, allow_subdomains: bool) -> bool {
    if root.is_empty() {
        return false;
    }

    if host == root || host.strip_prefix("www.") == Some(root) {
        return true;
    }

    allow_subdomains && matches_wildcard(&format!("*.{}", root), host)
}
