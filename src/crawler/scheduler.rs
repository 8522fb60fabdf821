//! Batch scheduling of domain crawlers
//!
//! This module handles:
//! - Partitioning the requested domains into balanced batches
//! - Allocating one renderer per domain that has work
//! - The round-robin loop that drives the members of one batch
//! - Releasing each renderer once its domain is exhausted

use crate::crawler::domain::DomainCrawler;
use crate::crawler::fetcher::FetchOutcome;
use crate::crawler::renderer::TabAllocator;
use crate::output::DomainSummary;

/// Splits `items` into batches of at most `max_per_batch`
///
/// With more items than fit in one batch, the number of batches is the
/// smallest that respects the limit and sizes differ by at most one, larger
/// batches first. Order is preserved.
///
/// # Examples
///
/// ```
/// use study_crawl::crawler::partition;
///
/// let sizes: Vec<usize> = partition((0..13).collect(), 4)
///     .iter()
///     .map(Vec::len)
///     .collect();
/// assert_eq!(sizes, vec![4, 3, 3, 3]);
/// ```
pub fn partition<T>(items: Vec<T>, max_per_batch: usize) -> Vec<Vec<T>> {
    let max_per_batch = max_per_batch.max(1);
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let count = total.div_ceil(max_per_batch);
    let base = total / count;
    let remainder = total % count;

    let mut batches = Vec::with_capacity(count);
    let mut items = items.into_iter();
    for i in 0..count {
        let size = if i < remainder { base + 1 } else { base };
        batches.push(items.by_ref().take(size).collect());
    }

    batches
}

/// A group of domain crawlers driven by one worker
pub struct Batch {
    id: usize,
    members: Vec<DomainCrawler>,
}

impl Batch {
    pub fn new(id: usize, members: Vec<DomainCrawler>) -> Self {
        Self { id, members }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn domains(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.domain()).collect()
    }

    /// Requests a renderer for every member that has work
    ///
    /// Members already exhausted after discovery get none. A member whose
    /// allocation fails is exhausted.
    ///
    /// # Returns
    ///
    /// Number of renderers obtained
    pub async fn allocate(&mut self, allocator: &dyn TabAllocator) -> usize {
        let mut allocated = 0;

        for member in self.members.iter_mut() {
            if member.is_exhausted() {
                continue;
            }

            match allocator.allocate(member.domain()).await {
                Ok(renderer) => {
                    tracing::debug!("Batch {}: renderer allocated for {}", self.id, member.domain());
                    member.attach_renderer(renderer);
                    allocated += 1;
                }
                Err(e) => member.allocation_failed(&e),
            }
        }

        allocated
    }

    /// Drives the members round-robin until every one is exhausted
    ///
    /// Each pass visits every active member once and processes one frontier
    /// entry. An empty frontier is refreshed from the ledger; a member with
    /// nothing left is exhausted. A pass without any download or permanent
    /// failure triggers a refresh of every remaining member, exhausting those
    /// still empty. A member's renderer is released as soon as it is
    /// exhausted; any left are released before returning.
    ///
    /// # Returns
    ///
    /// One summary per member
    pub async fn run(mut self, allocator: &dyn TabAllocator) -> Vec<DomainSummary> {
        tracing::info!("Batch {} starting: {}", self.id, self.domains().join(", "));
        let mut passes = 0u64;

        loop {
            let mut active = 0;
            let mut progressed = false;

            for member in self.members.iter_mut() {
                if member.is_exhausted() {
                    continue;
                }
                active += 1;

                match member.fetch_one().await {
                    Ok(outcome) => {
                        progressed |= outcome.is_progress();

                        match outcome {
                            FetchOutcome::Empty => refill_or_exhaust(member),
                            FetchOutcome::Retryable(_) if member.state().renderer_degraded => {
                                member.exhaust()
                            }
                            _ => {}
                        }
                    }
                    Err(e) => {
                        tracing::error!("{}: ledger error, stopping domain: {}", member.domain(), e);
                        member.exhaust();
                    }
                }

                if member.is_exhausted() {
                    release_renderer(member, allocator).await;
                }
            }

            if active == 0 {
                break;
            }
            passes += 1;

            if !progressed {
                tracing::debug!("Batch {}: pass {} made no progress", self.id, passes);
                for member in self.members.iter_mut().filter(|m| !m.is_exhausted()) {
                    refill_or_exhaust(member);
                    if member.is_exhausted() {
                        release_renderer(member, allocator).await;
                    }
                }
            }
        }

        for member in self.members.iter_mut() {
            release_renderer(member, allocator).await;
        }

        tracing::info!("Batch {} finished after {} pass(es)", self.id, passes);
        self.members.iter().map(DomainCrawler::summary).collect()
    }
}

/// Hands a member's renderer back to the allocator, if it still holds one
async fn release_renderer(member: &mut DomainCrawler, allocator: &dyn TabAllocator) {
    if let Some(renderer) = member.take_renderer() {
        tracing::debug!("{}: renderer released", member.domain());
        allocator.release(member.domain(), renderer).await;
    }
}

/// Refreshes an empty frontier from the ledger and exhausts the member if
/// nothing comes back
fn refill_or_exhaust(member: &mut DomainCrawler) {
    if member.frontier_len() > 0 {
        return;
    }

    match member.refresh_frontier() {
        Ok(0) => member.exhaust(),
        Ok(queued) => tracing::debug!("{}: {} pending entry(ies) requeued", member.domain(), queued),
        Err(e) => {
            tracing::error!("{}: ledger error, stopping domain: {}", member.domain(), e);
            member.exhaust();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::domain::CrawlOptions;
    use crate::crawler::fetcher::RenderTiming;
    use crate::crawler::parser::LinkScope;
    use crate::crawler::renderer::{ReadyState, RenderError, RenderResult, Renderer};
    use crate::output::RendererStatus;
    use crate::state::CrawlPhase;
    use crate::storage::MemoryLedger;
    use crate::url::UrlFilter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Renderer answering every page with the same document
    struct FixedRenderer {
        html: String,
    }

    #[async_trait]
    impl Renderer for FixedRenderer {
        async fn navigate(&mut self, _url: &str) -> RenderResult<()> {
            Ok(())
        }

        async fn ready_state(&mut self) -> RenderResult<ReadyState> {
            Ok(ReadyState::Complete)
        }

        async fn html(&mut self) -> RenderResult<String> {
            Ok(self.html.clone())
        }

        async fn links(&mut self) -> RenderResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct CountingAllocator {
        html: String,
        fail: bool,
        allocated: AtomicUsize,
        released: AtomicUsize,
    }

    impl CountingAllocator {
        fn new(html: &str, fail: bool) -> Self {
            Self {
                html: html.to_string(),
                fail,
                allocated: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TabAllocator for CountingAllocator {
        async fn allocate(&self, domain: &str) -> RenderResult<Box<dyn Renderer>> {
            if self.fail {
                return Err(RenderError::Allocation {
                    domain: domain.to_string(),
                    message: "no tabs".to_string(),
                });
            }
            self.allocated.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedRenderer {
                html: self.html.clone(),
            }))
        }

        async fn release(&self, _domain: &str, _renderer: Box<dyn Renderer>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Renderer serving one document and counting navigations across tabs
    struct TallyRenderer {
        html: String,
        navigations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Renderer for TallyRenderer {
        async fn navigate(&mut self, _url: &str) -> RenderResult<()> {
            self.navigations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn ready_state(&mut self) -> RenderResult<ReadyState> {
            Ok(ReadyState::Complete)
        }

        async fn html(&mut self) -> RenderResult<String> {
            Ok(self.html.clone())
        }

        async fn links(&mut self) -> RenderResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    /// Allocator with one document per domain, recording when each tab is
    /// released relative to the total navigation count
    struct TallyAllocator {
        pages: HashMap<String, String>,
        navigations: Arc<AtomicUsize>,
        releases: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl TabAllocator for TallyAllocator {
        async fn allocate(&self, domain: &str) -> RenderResult<Box<dyn Renderer>> {
            Ok(Box::new(TallyRenderer {
                html: self.pages.get(domain).cloned().unwrap_or_default(),
                navigations: Arc::clone(&self.navigations),
            }))
        }

        async fn release(&self, domain: &str, _renderer: Box<dyn Renderer>) {
            let navigations = self.navigations.load(Ordering::SeqCst);
            self.releases
                .lock()
                .unwrap()
                .push((domain.to_string(), navigations));
        }
    }

    fn create_test_member(domain: &str) -> DomainCrawler {
        let scope = LinkScope::new(domain, false, UrlFilter::default());
        let options = CrawlOptions {
            timing: RenderTiming::immediate(),
            page_delay: None,
            min_content_bytes: 500,
            max_renderer_errors: 3,
        };
        let mut crawler = DomainCrawler::new(scope, Box::new(MemoryLedger::new()), options);
        crawler.discover().unwrap();
        crawler
    }

    #[test]
    fn test_partition_single_batch() {
        let batches = partition(vec![1, 2, 3], 4);
        assert_eq!(batches, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_partition_balanced() {
        let sizes: Vec<usize> = partition((0..13).collect::<Vec<_>>(), 4)
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![4, 3, 3, 3]);

        let sizes: Vec<usize> = partition((0..9).collect::<Vec<_>>(), 4)
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![3, 3, 3]);
    }

    #[test]
    fn test_partition_keeps_order() {
        let batches = partition(vec!["a", "b", "c", "d", "e"], 2);
        assert_eq!(batches, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
    }

    #[test]
    fn test_partition_empty_and_zero_limit() {
        assert!(partition(Vec::<u8>::new(), 4).is_empty());
        assert_eq!(partition(vec![1, 2], 0), vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_short_pages_end_in_one_pass() {
        let allocator = CountingAllocator::new("<html></html>", false);
        let mut batch = Batch::new(
            0,
            vec![create_test_member("a.com"), create_test_member("b.com")],
        );

        assert_eq!(batch.allocate(&allocator).await, 2);
        let summaries = batch.run(&allocator).await;

        assert_eq!(summaries.len(), 2);
        for summary in &summaries {
            assert_eq!(summary.phase, CrawlPhase::Exhausted);
            assert_eq!(summary.downloaded, 0);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.ledger.pending, 0);
        }
        assert_eq!(allocator.released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_member_releases_renderer_early() {
        let long_page = format!(
            "<html><head><title>Home</title></head><body>{}{}</body></html>",
            "<a href=\"/p1\">1</a><a href=\"/p2\">2</a><a href=\"/p3\">3</a>",
            "<p>content</p>".repeat(60)
        );
        let allocator = TallyAllocator {
            pages: HashMap::from([
                ("a.com".to_string(), "<html></html>".to_string()),
                ("b.com".to_string(), long_page),
            ]),
            navigations: Arc::new(AtomicUsize::new(0)),
            releases: Mutex::new(Vec::new()),
        };
        let mut batch = Batch::new(
            0,
            vec![create_test_member("a.com"), create_test_member("b.com")],
        );

        assert_eq!(batch.allocate(&allocator).await, 2);
        let summaries = batch.run(&allocator).await;
        assert_eq!(summaries[1].downloaded, 4);

        // a.com gave its tab back while b.com still had pages to render
        let releases = allocator.releases.lock().unwrap().clone();
        assert_eq!(
            releases,
            vec![("a.com".to_string(), 2), ("b.com".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn test_allocation_failure_ends_batch() {
        let allocator = CountingAllocator::new("<html></html>", true);
        let mut batch = Batch::new(0, vec![create_test_member("a.com")]);

        assert_eq!(batch.allocate(&allocator).await, 0);
        let summaries = batch.run(&allocator).await;

        assert_eq!(summaries[0].renderer, RendererStatus::AllocationFailed);
        assert_eq!(summaries[0].ledger.pending, 1);
        assert_eq!(allocator.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_member_gets_no_renderer() {
        let allocator = CountingAllocator::new("<html></html>", false);
        let mut idle = create_test_member("a.com");
        idle.exhaust();
        let mut batch = Batch::new(0, vec![idle]);

        assert_eq!(batch.allocate(&allocator).await, 0);
        let summaries = batch.run(&allocator).await;
        assert_eq!(summaries[0].renderer, RendererStatus::NotNeeded);
    }
}
