//! Output module for crawl reports and ledger statistics
//!
//! This module handles:
//! - The per-domain summary printed at the end of a run
//! - Ledger statistics printed by `--stats`

mod report;
pub mod stats;

pub use report::{print_report, CrawlReport, DomainSummary, RendererStatus};
pub use stats::{load_statistics, load_study_statistics, print_statistics, LedgerStatistics};
