use crate::{ConfigError, ConfigResult};
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Include patterns applied when a study has no `config.json`
///
/// Empty means every in-scope URL is accepted.
pub const DEFAULT_INCLUDE_PATTERNS: &[&str] = &[];

/// Exclude patterns applied when a study has no `config.json`
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    r"\?",
    r"#",
    r"/docs/",
    r"/api/",
    r"/cdn-cgi/",
    BINARY_EXTENSIONS,
    ASSET_EXTENSIONS,
];

const BINARY_EXTENSIONS: &str =
    r"\.(jpg|jpeg|png|gif|webp|svg|ico|pdf|zip|tar|gz|mp4|mp3|wav|avi)(\?|$)";

const ASSET_EXTENSIONS: &str =
    r"\.(css|js|mjs|json|xml|txt|map|woff|woff2|ttf|eot|otf|rss|atom)(\?|$)";

static BINARY_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(&format!("{}|{}", BINARY_EXTENSIONS, ASSET_EXTENSIONS))
        .case_insensitive(true)
        .build()
        .expect("built-in extension pattern is valid")
});

/// Checks if a domain matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches "example.com" and any subdomain
///
/// # Examples
///
/// ```
/// use study_crawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Returns true if the URL points at a binary, media or non-HTML asset
///
/// Such targets are never rendered; they are recorded as `skipped_binary`.
pub fn is_binary_target(url: &str) -> bool {
    BINARY_TARGET.is_match(url)
}

/// Include/exclude filter applied to canonical URLs before admission
///
/// Patterns are case-insensitive regular expressions searched anywhere in the
/// URL. A URL passes when it matches at least one include pattern (if any are
/// configured) and none of the exclude patterns. Excludes take precedence.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl UrlFilter {
    /// Compiles a filter from pattern strings
    ///
    /// # Returns
    ///
    /// * `Ok(UrlFilter)` - All patterns compiled
    /// * `Err(ConfigError::InvalidPattern)` - The first pattern that failed
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> ConfigResult<Self> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Decides whether a canonical URL is in scope for this study
    pub fn should_include(&self, url: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(url)) {
            return false;
        }

        !self.exclude.iter().any(|re| re.is_match(url))
    }

    pub fn include_count(&self) -> usize {
        self.include.len()
    }

    pub fn exclude_count(&self) -> usize {
        self.exclude.len()
    }
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new(DEFAULT_INCLUDE_PATTERNS, DEFAULT_EXCLUDE_PATTERNS)
            .expect("built-in URL patterns are valid")
    }
}

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> ConfigResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p.as_ref())
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    message: e.to_string(),
                })
        })
        .collect()
}
