//! Crawler for a single domain
//!
//! A `DomainCrawler` owns everything needed to crawl one root domain: the
//! ledger, the frontier rebuilt from it, the link scope and, while it is being
//! crawled, one renderer handle.

use crate::config::CrawlerSettings;
use crate::crawler::classifier::{classify, Classification};
use crate::crawler::fetcher::{render_page, FetchOutcome, RenderTiming};
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::{collect_links, static_links, LinkScope};
use crate::crawler::renderer::{RenderError, Renderer};
use crate::output::{DomainSummary, RendererStatus};
use crate::state::{CrawlPhase, DomainState, FailureReason};
use crate::storage::{provenance_url, Ledger, LedgerCounts, StorageResult};
use crate::url::{is_binary_target, url_hash};
use std::time::{Duration, Instant};
use url::Url;

/// Per-domain crawl policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    pub timing: RenderTiming,

    /// Pause between the end of one render and the start of the next, if any
    pub page_delay: Option<Duration>,

    pub min_content_bytes: usize,

    /// Consecutive transport errors before the renderer is abandoned
    pub max_renderer_errors: u32,
}

impl CrawlOptions {
    /// Builds the policy from settings
    ///
    /// The inter-page delay only applies when a single domain is crawled; with
    /// several, the round-robin over the batch spaces the requests instead.
    pub fn from_settings(settings: &CrawlerSettings, single_domain: bool) -> Self {
        let page_delay = if single_domain && settings.page_delay_ms > 0 {
            Some(settings.page_delay())
        } else {
            None
        };

        Self {
            timing: RenderTiming::from_settings(settings),
            page_delay,
            min_content_bytes: settings.min_content_bytes,
            max_renderer_errors: settings.max_renderer_errors,
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from_settings(&CrawlerSettings::default(), true)
    }
}

/// Crawls one root domain
pub struct DomainCrawler {
    scope: LinkScope,
    ledger: Box<dyn Ledger>,
    frontier: Frontier,
    renderer: Option<Box<dyn Renderer>>,
    renderer_status: RendererStatus,
    state: DomainState,
    options: CrawlOptions,
}

impl DomainCrawler {
    /// Creates a crawler in the `Discovering` phase
    ///
    /// # Arguments
    ///
    /// * `scope` - Root domain, subdomain policy and URL filter
    /// * `ledger` - The domain's ledger
    /// * `options` - Timing and failure policy
    pub fn new(scope: LinkScope, ledger: Box<dyn Ledger>, options: CrawlOptions) -> Self {
        Self {
            scope,
            ledger,
            frontier: Frontier::new(),
            renderer: None,
            renderer_status: RendererStatus::NotNeeded,
            state: DomainState::new(),
            options,
        }
    }

    pub fn domain(&self) -> &str {
        self.scope.root()
    }

    pub fn phase(&self) -> CrawlPhase {
        self.state.phase
    }

    pub fn state(&self) -> &DomainState {
        &self.state
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.is_exhausted()
    }

    pub fn renderer_status(&self) -> RendererStatus {
        self.renderer_status
    }

    /// Drops the domain from further rounds; the ledger is left intact
    pub fn exhaust(&mut self) {
        if !self.state.is_exhausted() {
            tracing::info!(
                "{}: exhausted ({} downloaded, {} failed this run)",
                self.domain(),
                self.state.downloaded,
                self.state.failed
            );
        }
        self.state.phase = CrawlPhase::Exhausted;
    }

    /// Hands the crawler its renderer
    pub fn attach_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = Some(renderer);
        self.renderer_status = RendererStatus::Allocated;
    }

    /// Records that no renderer could be obtained and exhausts the domain
    pub fn allocation_failed(&mut self, error: &RenderError) {
        tracing::warn!("{}: {}", self.domain(), error);
        self.renderer_status = RendererStatus::AllocationFailed;
        self.exhaust();
    }

    /// Takes the renderer back, for release to the allocator
    pub fn take_renderer(&mut self) -> Option<Box<dyn Renderer>> {
        self.renderer.take()
    }

    /// Re-reads stored pages, admits their links, then rebuilds the frontier
    ///
    /// Links are found with the static scan only, resolved against the URL in
    /// each page's provenance comment. A ledger with no entries at all is
    /// seeded with the canonical root URL, whatever the include patterns say.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of URLs newly admitted
    /// * `Err(StorageError)` - The ledger could not be read or written
    pub fn discover(&mut self) -> StorageResult<usize> {
        self.state.phase = CrawlPhase::Discovering;
        let mut admitted = 0;

        for hash in self.ledger.downloaded()? {
            let Some(content) = self.ledger.read_content(&hash)? else {
                continue;
            };

            let base = match provenance_url(&content) {
                Some(url) => Some(url.to_string()),
                None => self.ledger.lookup_url(&hash)?,
            }
            .and_then(|url| Url::parse(&url).ok())
            .or_else(|| Url::parse(&format!("https://{}/", self.scope.root())).ok());

            let Some(base) = base else {
                continue;
            };

            for link in static_links(&content, &base, &self.scope) {
                if self.ledger.register_url(&link)? {
                    admitted += 1;
                }
            }
        }

        let counts = self.ledger.counts()?;
        if counts.total == 0 && counts.failed == 0 {
            if let Some(root_url) = self.scope.root_url() {
                if self.ledger.register_url(&root_url)? {
                    tracing::info!("{}: new study, seeded with {}", self.domain(), root_url);
                    admitted += 1;
                }
            }
        }

        self.state.discovered += admitted as u64;
        let queued = self.refresh_frontier()?;

        tracing::info!(
            "{}: discovery admitted {} new URL(s), {} pending",
            self.domain(),
            admitted,
            queued
        );

        self.state.phase = if self.frontier.is_empty() {
            CrawlPhase::Exhausted
        } else {
            CrawlPhase::Crawling
        };

        Ok(admitted)
    }

    /// Queues pending ledger entries that are not queued yet
    ///
    /// Returns the number of entries added.
    pub fn refresh_frontier(&mut self) -> StorageResult<usize> {
        self.frontier.refresh_from(self.ledger.as_ref())
    }

    /// Processes the next frontier entry
    ///
    /// Renderer errors never escape: they become `FetchOutcome::Retryable` and
    /// the entry stays pending. Only ledger errors are returned.
    pub async fn fetch_one(&mut self) -> StorageResult<FetchOutcome> {
        let Some((hash, url)) = self.frontier.pop() else {
            return Ok(FetchOutcome::Empty);
        };

        if self.ledger.is_failed(&hash)? || self.ledger.is_downloaded(&hash)? {
            tracing::debug!("{}: already settled, skipping", url);
            return Ok(FetchOutcome::Skipped);
        }

        if is_binary_target(&url) {
            tracing::debug!("{}: binary target, not rendered", url);
            self.ledger
                .mark_failed(&hash, &url, &FailureReason::SkippedBinary)?;
            self.state.record_failure();
            return Ok(FetchOutcome::Failed(FailureReason::SkippedBinary));
        }

        let Some(renderer) = self.renderer.as_mut() else {
            let error = RenderError::Allocation {
                domain: self.scope.root().to_string(),
                message: "no renderer attached".to_string(),
            };
            self.allocation_failed(&error);
            return Ok(FetchOutcome::Retryable(error));
        };

        if let Some(delay) = self.options.page_delay {
            if let Some(wait) = self.state.time_until_next_request(delay, Instant::now()) {
                tracing::trace!("{}: waiting {:?} before next page", self.scope.root(), wait);
                tokio::time::sleep(wait).await;
            }
        }

        tracing::debug!("Rendering {}", url);
        let rendered = render_page(renderer.as_mut(), &url, &self.options.timing).await;
        // The delay counts from the end of the previous render
        self.state.record_request(Instant::now());

        let page = match rendered {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("{}: {} (will retry)", url, e);
                if self.state.record_render_error(self.options.max_renderer_errors) {
                    tracing::error!(
                        "{}: {} consecutive renderer errors, giving up on this domain",
                        self.domain(),
                        self.state.consecutive_render_errors
                    );
                    self.state.renderer_degraded = true;
                    self.renderer_status = RendererStatus::Degraded;
                }
                return Ok(FetchOutcome::Retryable(e));
            }
        };

        match classify(&page.html, self.options.min_content_bytes) {
            Classification::Failure(reason) => {
                tracing::warn!("{}: {}", url, reason);
                self.ledger.mark_failed(&hash, &url, &reason)?;
                self.state.record_failure();
                Ok(FetchOutcome::Failed(reason))
            }
            Classification::Success => {
                self.ledger.store_content(&hash, &url, &page.html)?;
                self.state.record_download();

                let new_links = self.admit_links(&url, &page.html, &page.links)?;
                tracing::info!(
                    "{}: {} bytes, {} new link(s)",
                    url,
                    page.html.len(),
                    new_links
                );

                Ok(FetchOutcome::Downloaded {
                    bytes: page.html.len(),
                    new_links,
                })
            }
        }
    }

    /// Registers the links of a downloaded page and queues the new ones
    fn admit_links(&mut self, page_url: &str, html: &str, rendered: &[String]) -> StorageResult<usize> {
        let Ok(base) = Url::parse(page_url) else {
            return Ok(0);
        };

        let mut admitted = 0;
        for link in collect_links(html, rendered, &base, &self.scope) {
            if self.ledger.register_url(&link)? {
                self.frontier.push(url_hash(&link), link);
                admitted += 1;
            }
        }

        self.state.discovered += admitted as u64;
        Ok(admitted)
    }

    /// Summary of this run for the final report
    pub fn summary(&self) -> DomainSummary {
        let ledger = match self.ledger.counts() {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!("{}: could not count ledger entries: {}", self.domain(), e);
                LedgerCounts::default()
            }
        };

        DomainSummary {
            domain: self.domain().to_string(),
            phase: self.state.phase,
            downloaded: self.state.downloaded,
            failed: self.state.failed,
            retryable: self.state.retryable,
            discovered: self.state.discovered,
            ledger,
            renderer: self.renderer_status,
        }
    }
}
