//! End-of-run crawl report
//!
//! Each batch returns one `DomainSummary` per member; the scheduler merges
//! them into a `CrawlReport` once every batch has finished.

use crate::state::CrawlPhase;
use crate::storage::LedgerCounts;
use std::fmt;
use std::time::Duration;

/// How a domain fared with its renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererStatus {
    /// Nothing was pending, so no tab was requested
    NotNeeded,
    Allocated,
    AllocationFailed,
    /// Abandoned after repeated transport errors
    Degraded,
}

impl RendererStatus {
    /// Returns true if the domain wanted a renderer and could not use one
    pub fn is_unusable(&self) -> bool {
        matches!(self, Self::AllocationFailed | Self::Degraded)
    }
}

impl fmt::Display for RendererStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotNeeded => "not needed",
            Self::Allocated => "allocated",
            Self::AllocationFailed => "allocation failed",
            Self::Degraded => "degraded",
        })
    }
}

/// What happened to one domain during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSummary {
    pub domain: String,
    pub phase: CrawlPhase,

    /// Pages downloaded during this run
    pub downloaded: u64,

    /// Pages permanently failed during this run
    pub failed: u64,

    /// Renderer errors during this run
    pub retryable: u64,

    /// URLs admitted to the ledger during this run
    pub discovered: u64,

    /// Ledger totals at the end of the run
    pub ledger: LedgerCounts,

    pub renderer: RendererStatus,
}

impl DomainSummary {
    /// Summary for a domain that never ran
    pub fn idle(domain: &str, ledger: LedgerCounts, renderer: RendererStatus) -> Self {
        Self {
            domain: domain.to_string(),
            phase: CrawlPhase::Exhausted,
            downloaded: 0,
            failed: 0,
            retryable: 0,
            discovered: 0,
            ledger,
            renderer,
        }
    }
}

/// Merged summaries of every batch
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub domains: Vec<DomainSummary>,
    pub batches: usize,
    pub elapsed: Duration,
}

impl CrawlReport {
    /// Appends the summaries of one finished batch
    pub fn merge(&mut self, summaries: Vec<DomainSummary>) {
        self.batches += 1;
        self.domains.extend(summaries);
    }

    pub fn total_downloaded(&self) -> u64 {
        self.domains.iter().map(|d| d.downloaded).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.domains.iter().map(|d| d.failed).sum()
    }

    /// Returns true if every domain that needed a renderer could not use one
    pub fn renderer_degraded(&self) -> bool {
        let mut needed = self
            .domains
            .iter()
            .filter(|d| d.renderer != RendererStatus::NotNeeded)
            .peekable();

        needed.peek().is_some() && needed.all(|d| d.renderer.is_unusable())
    }

    /// Domains sorted by name for display
    pub fn sorted_domains(&self) -> Vec<&DomainSummary> {
        let mut domains: Vec<&DomainSummary> = self.domains.iter().collect();
        domains.sort_by(|a, b| a.domain.cmp(&b.domain));
        domains
    }
}

/// Prints the report to stdout in a formatted manner
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Summary ===\n");

    println!(
        "{:<32} {:>10} {:>8} {:>10} {:>8}  {}",
        "Domain", "Downloaded", "Failed", "Total valid", "Pending", "Status"
    );

    for summary in report.sorted_domains() {
        let status = if summary.renderer.is_unusable() {
            format!("renderer {}", summary.renderer)
        } else {
            summary.phase.to_string()
        };

        println!(
            "{:<32} {:>10} {:>8} {:>10} {:>8}  {}",
            summary.domain,
            summary.downloaded,
            summary.failed,
            summary.ledger.downloaded,
            summary.ledger.pending,
            status
        );
    }

    println!();
    println!(
        "Run: {} downloaded, {} failed across {} domain(s) in {} batch(es), {:.1}s",
        report.total_downloaded(),
        report.total_failed(),
        report.domains.len(),
        report.batches,
        report.elapsed.as_secs_f64()
    );
}
