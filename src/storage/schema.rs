//! Database schema definitions
//!
//! The SQLite ledger mirrors the three namespaces of the filesystem layout plus
//! the removed archive. One database file holds one domain's ledger.

/// SQL schema for the ledger database
pub const SCHEMA_SQL: &str = r#"
-- Index namespace: hash -> canonical URL, written once
CREATE TABLE IF NOT EXISTS url_index (
    hash TEXT PRIMARY KEY,
    url TEXT NOT NULL
);

-- Content namespace: empty body means registered but not fetched
CREATE TABLE IF NOT EXISTS content (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT NOT NULL UNIQUE,
    body TEXT NOT NULL DEFAULT ''
);

-- Failure namespace: presence means permanently failed
CREATE TABLE IF NOT EXISTS failures (
    hash TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    reason TEXT NOT NULL,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failures_reason ON failures(reason);

-- Placeholders moved out of the content namespace on failure
CREATE TABLE IF NOT EXISTS removed (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT NOT NULL,
    archived_at TEXT NOT NULL,
    body TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["url_index", "content", "failures", "removed"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
