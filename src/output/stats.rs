//! Ledger statistics for `--stats`
//!
//! Reads a study's ledger without touching the renderer and reports counts by
//! state and failure reason.

use crate::config::LedgerBackend;
use crate::storage::{
    open_existing_ledger, Ledger, LedgerCounts, StorageError, StorageResult, StudyLayout,
};
use std::collections::HashMap;

/// Statistics of one study's ledger
#[derive(Debug, Clone)]
pub struct LedgerStatistics {
    pub domain: String,

    pub counts: LedgerCounts,

    /// Failure records by reason tag
    pub failures_by_reason: HashMap<String, u64>,
}

/// Tag counted for failure records that cannot be read back
const UNREADABLE_REASON: &str = "unreadable";

/// Loads statistics from a ledger
///
/// # Arguments
///
/// * `domain` - Root domain of the study
/// * `ledger` - The study's ledger
///
/// # Returns
///
/// * `Ok(LedgerStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to read the ledger
pub fn load_statistics(domain: &str, ledger: &dyn Ledger) -> StorageResult<LedgerStatistics> {
    let counts = ledger.counts()?;

    let mut failures_by_reason: HashMap<String, u64> = HashMap::new();
    for hash in ledger.failed_hashes()? {
        let tag = match ledger.failure(&hash) {
            Ok(Some(record)) => record.reason.as_str().to_string(),
            Ok(None) => continue,
            Err(StorageError::Corrupt { .. }) => UNREADABLE_REASON.to_string(),
            Err(e) => return Err(e),
        };
        *failures_by_reason.entry(tag).or_insert(0) += 1;
    }

    Ok(LedgerStatistics {
        domain: domain.to_string(),
        counts,
        failures_by_reason,
    })
}

/// Loads statistics for a study without creating it
///
/// A study that has never been crawled reports zero entries and leaves no
/// directories behind.
pub fn load_study_statistics(
    backend: LedgerBackend,
    layout: &StudyLayout,
) -> StorageResult<LedgerStatistics> {
    match open_existing_ledger(backend, layout)? {
        Some(ledger) => load_statistics(layout.domain(), ledger.as_ref()),
        None => Ok(LedgerStatistics {
            domain: layout.domain().to_string(),
            counts: LedgerCounts::default(),
            failures_by_reason: HashMap::new(),
        }),
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== {} ===", stats.domain);
    println!("  Entries:    {}", stats.counts.total);
    println!("  Downloaded: {}", stats.counts.downloaded);
    println!("  Pending:    {}", stats.counts.pending);
    println!("  Failed:     {}", stats.counts.failed);

    if !stats.failures_by_reason.is_empty() {
        println!("  Failures by reason:");
        let mut reasons: Vec<_> = stats.failures_by_reason.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (reason, count) in reasons {
            println!("    {}: {}", reason, count);
        }
    }

    let settled = stats.counts.downloaded + stats.counts.failed;
    let success_rate = if settled > 0 {
        (stats.counts.downloaded as f64 / settled as f64) * 100.0
    } else {
        0.0
    };
    println!("  Success rate: {:.1}%", success_rate);
    println!();
}
