//! SQLite ledger implementation
//!
//! This module provides a SQLite-based implementation of the Ledger trait.
//! Each domain gets its own database file inside its worker directory.

use crate::state::FailureReason;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Ledger, StorageResult};
use crate::storage::FailureRecord;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens or creates a ledger database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteLedger)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Number of placeholders moved into the removed archive
    pub fn removed_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM removed", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl Ledger for SqliteLedger {
    // ===== Index namespace =====

    fn has_index(&self, hash: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM url_index WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn write_index(&mut self, hash: &str, url: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO url_index (hash, url) VALUES (?1, ?2)",
            params![hash, url],
        )?;
        Ok(())
    }

    fn lookup_url(&self, hash: &str) -> StorageResult<Option<String>> {
        let url = self
            .conn
            .query_row(
                "SELECT url FROM url_index WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(url)
    }

    // ===== Content namespace =====

    fn touch(&mut self, hash: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO content (hash, body) VALUES (?1, '')",
            params![hash],
        )?;
        Ok(())
    }

    fn content_size(&self, hash: &str) -> StorageResult<Option<u64>> {
        let size: Option<i64> = self
            .conn
            .query_row(
                "SELECT length(CAST(body AS BLOB)) FROM content WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(size.map(|s| s as u64))
    }

    fn read_content(&self, hash: &str) -> StorageResult<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM content WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn write_content(&mut self, hash: &str, body: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO content (hash, body) VALUES (?1, ?2)
             ON CONFLICT(hash) DO UPDATE SET body = excluded.body",
            params![hash, body],
        )?;
        Ok(())
    }

    fn content_hashes(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT hash FROM content ORDER BY seq")?;
        let hashes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(hashes)
    }

    fn archive_placeholder(&mut self, hash: &str, timestamp: &str) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;

        let archived = tx.execute(
            "INSERT INTO removed (hash, archived_at, body)
             SELECT hash, ?2, body FROM content WHERE hash = ?1 AND length(body) = 0",
            params![hash, timestamp],
        )?;

        if archived > 0 {
            tx.execute("DELETE FROM content WHERE hash = ?1", params![hash])?;
        }

        tx.commit()?;
        Ok(archived > 0)
    }

    // ===== Failure namespace =====

    fn failure(&self, hash: &str) -> StorageResult<Option<FailureRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT url, reason, failed_at FROM failures WHERE hash = ?1",
                params![hash],
                |row| {
                    let reason: String = row.get(1)?;
                    Ok(FailureRecord {
                        url: row.get(0)?,
                        reason: FailureReason::from_tag(&reason),
                        timestamp: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn write_failure(&mut self, hash: &str, record: &FailureRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO failures (hash, url, reason, failed_at) VALUES (?1, ?2, ?3, ?4)",
            params![hash, record.url, record.reason.as_str(), record.timestamp],
        )?;
        Ok(())
    }

    fn failed_hashes(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT hash FROM failures ORDER BY failed_at, hash")?;
        let hashes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(hashes)
    }
}
