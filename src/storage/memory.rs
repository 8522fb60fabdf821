//! In-memory ledger implementation
//!
//! Keeps the three namespaces in hash maps. Nothing survives the process;
//! used by tests and dry runs.

use crate::storage::traits::{Ledger, StorageResult};
use crate::storage::FailureRecord;
use std::collections::HashMap;

/// In-memory ledger backend
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    index: HashMap<String, String>,
    content: HashMap<String, String>,
    /// Content hashes in creation order
    order: Vec<String>,
    failures: HashMap<String, FailureRecord>,
    removed: Vec<(String, String)>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archived placeholders as (timestamp, hash)
    pub fn removed(&self) -> &[(String, String)] {
        &self.removed
    }
}

impl Ledger for MemoryLedger {
    fn has_index(&self, hash: &str) -> StorageResult<bool> {
        Ok(self.index.contains_key(hash))
    }

    fn write_index(&mut self, hash: &str, url: &str) -> StorageResult<()> {
        self.index
            .entry(hash.to_string())
            .or_insert_with(|| url.to_string());
        Ok(())
    }

    fn lookup_url(&self, hash: &str) -> StorageResult<Option<String>> {
        Ok(self.index.get(hash).cloned())
    }

    fn touch(&mut self, hash: &str) -> StorageResult<()> {
        if !self.content.contains_key(hash) {
            self.content.insert(hash.to_string(), String::new());
            self.order.push(hash.to_string());
        }
        Ok(())
    }

    fn content_size(&self, hash: &str) -> StorageResult<Option<u64>> {
        Ok(self.content.get(hash).map(|body| body.len() as u64))
    }

    fn read_content(&self, hash: &str) -> StorageResult<Option<String>> {
        Ok(self.content.get(hash).cloned())
    }

    fn write_content(&mut self, hash: &str, body: &str) -> StorageResult<()> {
        if self
            .content
            .insert(hash.to_string(), body.to_string())
            .is_none()
        {
            self.order.push(hash.to_string());
        }
        Ok(())
    }

    fn content_hashes(&self) -> StorageResult<Vec<String>> {
        Ok(self.order.clone())
    }

    fn archive_placeholder(&mut self, hash: &str, timestamp: &str) -> StorageResult<bool> {
        if self.content.get(hash).is_some_and(|body| body.is_empty()) {
            self.content.remove(hash);
            self.order.retain(|h| h != hash);
            self.removed.push((timestamp.to_string(), hash.to_string()));
            return Ok(true);
        }
        Ok(false)
    }

    fn failure(&self, hash: &str) -> StorageResult<Option<FailureRecord>> {
        Ok(self.failures.get(hash).cloned())
    }

    fn write_failure(&mut self, hash: &str, record: &FailureRecord) -> StorageResult<()> {
        self.failures.insert(hash.to_string(), record.clone());
        Ok(())
    }

    fn failed_hashes(&self) -> StorageResult<Vec<String>> {
        let mut hashes: Vec<String> = self.failures.keys().cloned().collect();
        hashes.sort();
        Ok(hashes)
    }
}
