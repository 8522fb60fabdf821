use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of one domain crawler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Re-reading downloaded pages to seed the frontier
    Discovering,

    /// Frontier non-empty, actively fetching
    Crawling,

    /// Frontier empty and nothing left to recover; dropped from rounds
    Exhausted,
}

impl CrawlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovering => "discovering",
            Self::Crawling => "crawling",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of a domain during crawling
///
/// This structure holds the per-run counters reported in the final summary,
/// the spacing between page requests, and the renderer health signal.
#[derive(Debug, Clone)]
pub struct DomainState {
    pub phase: CrawlPhase,

    /// Pages downloaded during this run
    pub downloaded: u64,

    /// Pages permanently failed during this run
    pub failed: u64,

    /// Renderer transport errors during this run
    pub retryable: u64,

    /// New URLs admitted to the ledger during this run
    pub discovered: u64,

    /// Transport errors since the last successful render
    pub consecutive_render_errors: u32,

    /// When the last render on this domain ended
    pub last_request_time: Option<Instant>,

    /// Set once the renderer is considered unusable for this domain
    pub renderer_degraded: bool,
}

impl DomainState {
    pub fn new() -> Self {
        Self {
            phase: CrawlPhase::Discovering,
            downloaded: 0,
            failed: 0,
            retryable: 0,
            discovered: 0,
            consecutive_render_errors: 0,
            last_request_time: None,
            renderer_degraded: false,
        }
    }

    /// Records that the previous page finished rendering
    pub fn record_request(&mut self, now: Instant) {
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.duration_since(last);
        if elapsed < min_delay {
            Some(min_delay - elapsed)
        } else {
            None
        }
    }

    pub fn record_download(&mut self) {
        self.downloaded += 1;
        self.consecutive_render_errors = 0;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
        self.consecutive_render_errors = 0;
    }

    /// Records a transport error and reports whether `limit` has been reached
    pub fn record_render_error(&mut self, limit: u32) -> bool {
        self.retryable += 1;
        self.consecutive_render_errors += 1;
        limit > 0 && self.consecutive_render_errors >= limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == CrawlPhase::Exhausted
    }
}

impl Default for DomainState {
    fn default() -> Self {
        Self::new()
    }
}
