//! Per-domain crawl frontier
//!
//! An in-memory FIFO of `(hash, url)` pairs with a set of the hashes currently
//! queued. It holds nothing the ledger does not: every queued entry is a
//! pending ledger entry, so the frontier can be dropped and rebuilt at will.

use crate::storage::{Ledger, StorageResult};
use std::collections::{HashSet, VecDeque};

/// FIFO queue of pending pages for one domain
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<(String, String)>,
    queued: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry unless its hash is already queued
    ///
    /// Returns true if the entry was added.
    pub fn push(&mut self, hash: String, url: String) -> bool {
        if !self.queued.insert(hash.clone()) {
            return false;
        }
        self.queue.push_back((hash, url));
        true
    }

    /// Takes the oldest entry
    ///
    /// The hash leaves the dedup set, so a later refresh can queue it again if
    /// it is still pending in the ledger.
    pub fn pop(&mut self) -> Option<(String, String)> {
        let (hash, url) = self.queue.pop_front()?;
        self.queued.remove(&hash);
        Some((hash, url))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.queued.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues every pending ledger entry not already queued
    ///
    /// Returns the number of entries added.
    pub fn refresh_from(&mut self, ledger: &dyn Ledger) -> StorageResult<usize> {
        let mut added = 0;
        for (hash, url) in ledger.pending()? {
            if self.push(hash, url) {
                added += 1;
            }
        }
        Ok(added)
    }
}
