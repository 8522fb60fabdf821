use crate::UrlError;
use url::Url;

/// Normalizes a URL into the canonical form used for content addressing
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Remove the fragment and the whole query string
/// 3. Enforce HTTPS: convert http:// to https://
/// 4. If the host is the bare root domain (at most two labels), rewrite it to
///    the `www.` form, the way most sites 301-redirect
/// 5. Remove a single trailing slash unless the path is the root `/`
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize (must be absolute)
/// * `root_domain` - The crawl root, without `www.` (e.g. "example.com")
///
/// # Returns
///
/// * `Ok(String)` - Canonical URL
/// * `Err(UrlError)` - The URL cannot be canonicalized and should be dropped
///
/// # Examples
///
/// ```
/// use study_crawl::url::normalize_url;
///
/// let url = normalize_url("http://example.com/page/?ref=x#top", "example.com").unwrap();
/// assert_eq!(url, "https://www.example.com/page");
/// ```
pub fn normalize_url(url_str: &str, root_domain: &str) -> Result<String, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "https" => {}
        "http" => url
            .set_scheme("https")
            .map_err(|_| UrlError::Malformed(format!("Cannot upgrade scheme of {}", url_str)))?,
        other => {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are supported, got: {}",
                other
            )))
        }
    }

    url.set_fragment(None);
    url.set_query(None);

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingDomain)?;

    if is_bare_root(&host, root_domain) {
        url.set_host(Some(&format!("www.{}", host)))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    }

    Ok(url.into())
}

/// Returns true when `host` is the root domain itself and the root has no
/// subdomain part. Subdomains such as `docs.example.com` are never rewritten.
fn is_bare_root(host: &str, root_domain: &str) -> bool {
    !root_domain.is_empty() && host == root_domain && root_domain.split('.').count() <= 2
}
