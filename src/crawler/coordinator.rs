//! Crawl coordinator - runs every requested study to completion
//!
//! This module ties the pieces together:
//! - Opening each study's ledger and URL filter
//! - Discovery, before any renderer is requested
//! - Partitioning into batches and sequential tab allocation
//! - One worker task per batch, joined and merged into a `CrawlReport`

use crate::config::{load_study_config, Settings};
use crate::crawler::domain::{CrawlOptions, DomainCrawler};
use crate::crawler::parser::LinkScope;
use crate::crawler::renderer::TabAllocator;
use crate::crawler::scheduler::{partition, Batch};
use crate::output::{CrawlReport, DomainSummary, RendererStatus};
use crate::storage::{open_ledger, LedgerCounts, StudyLayout};
use crate::{CrawlError, Result};
use std::sync::Arc;
use std::time::Instant;

/// What to crawl and how
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    /// Root domains, without `www.`
    pub domains: Vec<String>,

    /// Follow links to subdomains of each root
    pub allow_subdomains: bool,

    pub settings: Settings,
}

impl CrawlPlan {
    pub fn new(domains: Vec<String>, allow_subdomains: bool, settings: Settings) -> Self {
        Self {
            domains,
            allow_subdomains,
            settings,
        }
    }

    /// On-disk layout of one study
    pub fn layout(&self, domain: &str) -> StudyLayout {
        StudyLayout::new(
            &self.settings.output.base_dir,
            domain,
            &self.settings.crawler.worker,
        )
    }

    /// Domain names grouped the way they will be batched
    pub fn batches(&self) -> Vec<Vec<String>> {
        partition(self.domains.clone(), self.settings.crawler.max_per_batch)
    }

    fn options(&self) -> CrawlOptions {
        CrawlOptions::from_settings(&self.settings.crawler, self.domains.len() == 1)
    }
}

/// Opens one study: its `config.json`, URL filter and ledger
///
/// # Arguments
///
/// * `plan` - The crawl plan
/// * `domain` - Root domain of the study
///
/// # Returns
///
/// * `Ok(DomainCrawler)` - A crawler in the `Discovering` phase
/// * `Err(CrawlError)` - The study config is invalid or the ledger cannot be opened
pub fn open_study(plan: &CrawlPlan, domain: &str) -> Result<DomainCrawler> {
    let layout = plan.layout(domain);

    let study = load_study_config(&layout.config_path())?;
    let filter = study.filter()?;
    tracing::debug!(
        "{}: {} include / {} exclude pattern(s)",
        domain,
        filter.include_count(),
        filter.exclude_count()
    );

    let ledger = open_ledger(plan.settings.crawler.ledger, &layout)?;
    let scope = LinkScope::new(domain, plan.allow_subdomains, filter);

    Ok(DomainCrawler::new(scope, ledger, plan.options()))
}

/// Runs a complete crawl
///
/// 1. Open every study and run discovery
/// 2. Partition the crawlers into batches
/// 3. Allocate renderers, one batch after the other
/// 4. Run every batch on its own task and merge the summaries
///
/// A study that cannot be opened is reported and left out; the others still
/// run.
///
/// # Arguments
///
/// * `plan` - Domains and settings
/// * `allocator` - Source of renderer handles
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Per-domain summaries of this run
/// * `Err(CrawlError)` - A batch worker could not be joined
pub async fn run_crawl(plan: CrawlPlan, allocator: Arc<dyn TabAllocator>) -> Result<CrawlReport> {
    let start = Instant::now();
    let mut report = CrawlReport::default();
    let mut crawlers = Vec::with_capacity(plan.domains.len());

    for domain in &plan.domains {
        let mut crawler = match open_study(&plan, domain) {
            Ok(crawler) => crawler,
            Err(e) => {
                tracing::error!("{}: cannot open study: {}", domain, e);
                continue;
            }
        };

        if let Err(e) = crawler.discover() {
            tracing::error!("{}: discovery failed: {}", domain, e);
            report.domains.push(DomainSummary::idle(
                domain,
                LedgerCounts::default(),
                RendererStatus::NotNeeded,
            ));
            continue;
        }

        crawlers.push(crawler);
    }

    let mut batches: Vec<Batch> = partition(crawlers, plan.settings.crawler.max_per_batch)
        .into_iter()
        .enumerate()
        .map(|(id, members)| Batch::new(id, members))
        .collect();

    tracing::info!(
        "{} domain(s) in {} batch(es)",
        batches.iter().map(Batch::len).sum::<usize>(),
        batches.len()
    );

    for batch in batches.iter_mut() {
        let allocated = batch.allocate(allocator.as_ref()).await;
        tracing::info!(
            "Batch {}: {} renderer(s) for {} domain(s)",
            batch.id(),
            allocated,
            batch.len()
        );
    }

    let mut handles = Vec::with_capacity(batches.len());
    for batch in batches {
        let allocator = Arc::clone(&allocator);
        let id = batch.id();
        let handle = tokio::spawn(async move { batch.run(allocator.as_ref()).await });
        handles.push((id, handle));
    }

    let mut worker_error = None;
    for (id, handle) in handles {
        match handle.await {
            Ok(summaries) => report.merge(summaries),
            Err(e) => {
                tracing::error!("Batch {} worker failed: {}", id, e);
                worker_error = Some(CrawlError::Worker(format!("batch {}: {}", id, e)));
            }
        }
    }

    report.elapsed = start.elapsed();

    match worker_error {
        Some(e) if report.domains.is_empty() => Err(e),
        _ => Ok(report),
    }
}
