use crate::url::{UrlFilter, DEFAULT_EXCLUDE_PATTERNS, DEFAULT_INCLUDE_PATTERNS};
use crate::ConfigResult;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main settings structure
///
/// Every section and key is optional; a missing settings file is the same as
/// an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub crawler: CrawlerSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

/// Which ledger implementation backs each study
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// `html/`, `INDEX/` and `FAILED/` directories
    #[default]
    Fs,
    /// One `ledger.db` per study
    Sqlite,
}

impl LedgerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlerSettings {
    /// Maximum number of domains sharing one round-robin worker
    #[serde(rename = "max-per-batch", default = "default_max_per_batch")]
    pub max_per_batch: usize,

    /// Worker directory name under each study
    #[serde(default = "default_worker")]
    pub worker: String,

    #[serde(default)]
    pub ledger: LedgerBackend,

    /// Delay between pages when crawling a single domain (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Interval between readiness polls (milliseconds)
    #[serde(
        rename = "ready-poll-interval-ms",
        default = "default_ready_poll_interval_ms"
    )]
    pub ready_poll_interval_ms: u64,

    /// Give up waiting for readiness after this long and read the page anyway
    #[serde(rename = "ready-timeout-ms", default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Extra wait once the document is ready, for late scripts (milliseconds)
    #[serde(rename = "settle-delay-ms", default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Documents this short or shorter are classified `empty_response`
    #[serde(rename = "min-content-bytes", default = "default_min_content_bytes")]
    pub min_content_bytes: usize,

    /// Consecutive transport errors before a domain's renderer is abandoned
    ///
    /// Zero disables the limit.
    #[serde(
        rename = "max-renderer-errors",
        default = "default_max_renderer_errors"
    )]
    pub max_renderer_errors: u32,
}

impl CrawlerSettings {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            max_per_batch: default_max_per_batch(),
            worker: default_worker(),
            ledger: LedgerBackend::default(),
            page_delay_ms: default_page_delay_ms(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            min_content_bytes: default_min_content_bytes(),
            max_renderer_errors: default_max_renderer_errors(),
        }
    }
}

/// Browser bridge connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSettings {
    /// Base URL of the bridge HTTP server
    #[serde(default = "default_bridge_url")]
    pub url: String,

    /// Timeout for a single bridge request (seconds)
    #[serde(
        rename = "request-timeout-secs",
        default = "default_request_timeout_secs"
    )]
    pub request_timeout_secs: u64,

    /// Attempts per bridge request, including the first
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl BridgeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            request_timeout_secs: default_request_timeout_secs(),
            retries: default_retries(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    /// Directory holding `studies/` and `removed/`
    #[serde(rename = "base-dir", default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

fn default_max_per_batch() -> usize {
    4
}

fn default_worker() -> String {
    "300".to_string()
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_ready_poll_interval_ms() -> u64 {
    1000
}

fn default_ready_timeout_ms() -> u64 {
    15_000
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_min_content_bytes() -> usize {
    500
}

fn default_max_renderer_errors() -> u32 {
    5
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:9222".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Per-study URL filter configuration, read from `studies/<domain>/config.json`
///
/// Either list may be omitted; an omitted list falls back to the built-in
/// defaults, an explicitly empty list means "no patterns".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StudyConfig {
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl StudyConfig {
    /// Compiles the patterns into a `UrlFilter`
    pub fn filter(&self) -> ConfigResult<UrlFilter> {
        UrlFilter::new(&self.include_patterns, &self.exclude_patterns)
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            include_patterns: default_include_patterns(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

fn default_include_patterns() -> Vec<String> {
    DEFAULT_INCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_exclude_patterns() -> Vec<String> {
    DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect()
}
