//! Storage module for the per-domain URL ledger
//!
//! This module handles persistence of crawl state, including:
//! - The `Ledger` trait and its three namespaces (Index, Content, Failure)
//! - A filesystem backend laid out as `studies/<domain>/<worker>/{html,INDEX,FAILED}`
//! - A SQLite backend holding the same namespaces in one database per domain
//! - An in-memory backend for tests
//!
//! The ledger is the only durable state: a run can be interrupted at any point
//! and the next run rebuilds its frontier from it.

mod fs;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use fs::FsLedger;
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{Ledger, StorageError, StorageResult};

use crate::config::LedgerBackend;
use crate::state::{FailureReason, PageState};

use std::path::{Path, PathBuf};

/// Content strictly larger than this many bytes counts as downloaded
pub const DOWNLOADED_MIN_BYTES: u64 = 100;

/// Timestamp format used in failure records and archive names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File name of the SQLite ledger inside a worker directory
pub const SQLITE_LEDGER_FILE: &str = "ledger.db";

/// Represents one content address in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub hash: String,
    pub url: String,
    pub state: PageState,
    pub failure_reason: Option<FailureReason>,
    pub size_bytes: u64,
}

/// A permanent failure, stored as `url|reason|timestamp`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub url: String,
    pub reason: FailureReason,
    pub timestamp: String,
}

impl FailureRecord {
    /// Creates a record stamped with the current local time
    pub fn now(url: &str, reason: FailureReason) -> Self {
        Self {
            url: url.to_string(),
            reason,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Formats the record as a single `url|reason|timestamp` line
    pub fn to_line(&self) -> String {
        format!("{}|{}|{}", self.url, self.reason, self.timestamp)
    }

    /// Parses a `url|reason|timestamp` line
    ///
    /// The URL is everything before the last two separators, so a URL that
    /// itself contains `|` still parses. Older records without a timestamp
    /// are accepted with an empty one.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut parts = line.rsplitn(3, '|');
        let last = parts.next()?;
        let middle = parts.next()?;

        let (url, reason, timestamp) = match parts.next() {
            Some(url) => (url, middle, last),
            None => (middle, last, ""),
        };

        if url.is_empty() {
            return None;
        }

        Some(Self {
            url: url.to_string(),
            reason: FailureReason::from_tag(reason),
            timestamp: timestamp.to_string(),
        })
    }
}

/// Ledger totals by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    /// Content entries, whatever their state
    pub total: u64,
    pub pending: u64,
    pub downloaded: u64,
    pub failed: u64,
}

/// On-disk layout of one study
///
/// ```text
/// <base>/studies/<domain>/config.json
/// <base>/studies/<domain>/<worker>/html/<hash>.html
/// <base>/studies/<domain>/<worker>/INDEX/<hash>
/// <base>/studies/<domain>/<worker>/FAILED/<hash>
/// <base>/removed/<timestamp>_<hash>.html
/// ```
#[derive(Debug, Clone)]
pub struct StudyLayout {
    base_dir: PathBuf,
    domain: String,
    worker: String,
}

impl StudyLayout {
    pub fn new(base_dir: &Path, domain: &str, worker: &str) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            domain: domain.to_string(),
            worker: worker.to_string(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn study_dir(&self) -> PathBuf {
        self.base_dir.join("studies").join(&self.domain)
    }

    pub fn worker_dir(&self) -> PathBuf {
        self.study_dir().join(&self.worker)
    }

    pub fn config_path(&self) -> PathBuf {
        self.study_dir().join("config.json")
    }

    pub fn removed_dir(&self) -> PathBuf {
        self.base_dir.join("removed")
    }
}

/// Opens the ledger for one study, creating its directories if needed
///
/// # Arguments
///
/// * `backend` - Which ledger implementation to use
/// * `layout` - Where the study lives on disk
///
/// # Returns
///
/// * `Ok(Box<dyn Ledger>)` - Ready to use ledger
/// * `Err(StorageError)` - Directories or database could not be created
pub fn open_ledger(backend: LedgerBackend, layout: &StudyLayout) -> StorageResult<Box<dyn Ledger>> {
    let worker_dir = layout.worker_dir();
    std::fs::create_dir_all(&worker_dir)?;

    match backend {
        LedgerBackend::Fs => Ok(Box::new(FsLedger::open(&worker_dir, &layout.removed_dir())?)),
        LedgerBackend::Sqlite => Ok(Box::new(SqliteLedger::open(
            &worker_dir.join(SQLITE_LEDGER_FILE),
        )?)),
    }
}

/// Opens the ledger of a study that has already been crawled
///
/// Unlike `open_ledger`, nothing is created on disk.
///
/// # Returns
///
/// * `Ok(Some(ledger))` - The study's worker directory exists
/// * `Ok(None)` - The study has never been crawled by this worker
/// * `Err(StorageError)` - The ledger exists but could not be opened
pub fn open_existing_ledger(
    backend: LedgerBackend,
    layout: &StudyLayout,
) -> StorageResult<Option<Box<dyn Ledger>>> {
    if !layout.worker_dir().is_dir() {
        return Ok(None);
    }
    open_ledger(backend, layout).map(Some)
}

/// Extracts the source URL from a stored page's provenance comment
///
/// Stored pages start with `<!-- URL: <url> -->`.
pub fn provenance_url(content: &str) -> Option<&str> {
    let first_line = content.lines().next()?.trim();
    let rest = first_line.strip_prefix("<!-- URL:")?;
    let url = rest.strip_suffix("-->")?.trim();

    if url.is_empty() {
        None
    } else {
        Some(url)
    }
}
