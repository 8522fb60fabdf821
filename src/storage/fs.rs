//! Filesystem ledger implementation
//!
//! Each namespace is a directory of files named by URL hash:
//! - `html/<hash>.html` holds the rendered page, or nothing while pending
//! - `INDEX/<hash>` holds the canonical URL
//! - `FAILED/<hash>` holds a `url|reason|timestamp` record
//!
//! Placeholders of failed pages are moved into a shared `removed/` directory.

use crate::storage::traits::{Ledger, StorageError, StorageResult};
use crate::storage::FailureRecord;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Filesystem ledger backend
#[derive(Debug, Clone)]
pub struct FsLedger {
    html_dir: PathBuf,
    index_dir: PathBuf,
    failed_dir: PathBuf,
    removed_dir: PathBuf,
}

impl FsLedger {
    /// Opens the ledger rooted at a worker directory
    ///
    /// The `html` and `INDEX` directories are created immediately. `FAILED`
    /// and the removed archive are created on first use.
    ///
    /// # Arguments
    ///
    /// * `worker_dir` - The `studies/<domain>/<worker>` directory
    /// * `removed_dir` - Shared archive for placeholders of failed pages
    pub fn open(worker_dir: &Path, removed_dir: &Path) -> StorageResult<Self> {
        let ledger = Self {
            html_dir: worker_dir.join("html"),
            index_dir: worker_dir.join("INDEX"),
            failed_dir: worker_dir.join("FAILED"),
            removed_dir: removed_dir.to_path_buf(),
        };

        fs::create_dir_all(&ledger.html_dir)?;
        fs::create_dir_all(&ledger.index_dir)?;

        Ok(ledger)
    }

    pub fn html_dir(&self) -> &Path {
        &self.html_dir
    }

    pub fn removed_dir(&self) -> &Path {
        &self.removed_dir
    }

    fn html_path(&self, hash: &str) -> PathBuf {
        self.html_dir.join(format!("{}.html", hash))
    }

    fn index_path(&self, hash: &str) -> PathBuf {
        self.index_dir.join(hash)
    }

    fn failed_path(&self, hash: &str) -> PathBuf {
        self.failed_dir.join(hash)
    }
}

/// Reads a file, mapping "not found" to None
fn read_optional(path: &Path) -> StorageResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Ledger for FsLedger {
    // ===== Index namespace =====

    fn has_index(&self, hash: &str) -> StorageResult<bool> {
        Ok(self.index_path(hash).is_file())
    }

    fn write_index(&mut self, hash: &str, url: &str) -> StorageResult<()> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.index_path(hash))
        {
            Ok(mut file) => {
                file.write_all(url.as_bytes())?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn lookup_url(&self, hash: &str) -> StorageResult<Option<String>> {
        Ok(read_optional(&self.index_path(hash))?
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()))
    }

    // ===== Content namespace =====

    fn touch(&mut self, hash: &str) -> StorageResult<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.html_path(hash))?;
        Ok(())
    }

    fn content_size(&self, hash: &str) -> StorageResult<Option<u64>> {
        match fs::metadata(self.html_path(hash)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_content(&self, hash: &str) -> StorageResult<Option<String>> {
        read_optional(&self.html_path(hash))
    }

    fn write_content(&mut self, hash: &str, body: &str) -> StorageResult<()> {
        // Written aside and renamed so a crash never leaves a partial page
        // large enough to count as downloaded.
        let tmp = self.html_dir.join(format!("{}.html.tmp", hash));
        fs::write(&tmp, body)?;
        fs::rename(&tmp, self.html_path(hash))?;
        Ok(())
    }

    fn content_hashes(&self) -> StorageResult<Vec<String>> {
        let mut entries: Vec<(SystemTime, String)> = Vec::new();

        for entry in fs::read_dir(&self.html_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(hash) = name.to_str().and_then(|n| n.strip_suffix(".html")) else {
                continue;
            };
            let modified = entry
                .metadata()?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((modified, hash.to_string()));
        }

        entries.sort();
        Ok(entries.into_iter().map(|(_, hash)| hash).collect())
    }

    fn archive_placeholder(&mut self, hash: &str, timestamp: &str) -> StorageResult<bool> {
        if self.content_size(hash)? != Some(0) {
            return Ok(false);
        }

        fs::create_dir_all(&self.removed_dir)?;
        let target = self.removed_dir.join(format!("{}_{}.html", timestamp, hash));
        fs::rename(self.html_path(hash), target)?;
        Ok(true)
    }

    // ===== Failure namespace =====

    fn is_failed(&self, hash: &str) -> StorageResult<bool> {
        Ok(self.failed_path(hash).is_file())
    }

    fn failure(&self, hash: &str) -> StorageResult<Option<FailureRecord>> {
        let Some(line) = read_optional(&self.failed_path(hash))? else {
            return Ok(None);
        };

        FailureRecord::parse_line(&line)
            .map(Some)
            .ok_or_else(|| StorageError::Corrupt {
                hash: hash.to_string(),
                message: format!("unreadable failure record: {:?}", line.trim()),
            })
    }

    fn write_failure(&mut self, hash: &str, record: &FailureRecord) -> StorageResult<()> {
        fs::create_dir_all(&self.failed_dir)?;
        fs::write(self.failed_path(hash), record.to_line())?;
        Ok(())
    }

    fn failed_hashes(&self) -> StorageResult<Vec<String>> {
        let entries = match fs::read_dir(&self.failed_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut hashes = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                hashes.push(name.to_string());
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}
