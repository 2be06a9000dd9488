//! SQLite event log
//!
//! Persists one row per run and one row per event, so crawls can be
//! inspected after the fact with any SQLite client.

use crate::output::events::CrawlEvent;
use crate::output::stats::CrawlStats;
use crate::output::traits::ReportSink;
use crate::MirrorError;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQL schema for the event log
pub const SCHEMA_SQL: &str = r#"
-- One row per mirror run
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_url TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    succeeded INTEGER,
    failed INTEGER,
    skipped INTEGER,
    total_bytes INTEGER
);

-- One row per reported event
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    recorded_at TEXT NOT NULL,
    kind TEXT NOT NULL,
    url TEXT NOT NULL,
    resource_kind TEXT,
    bytes INTEGER NOT NULL,
    elapsed_ms INTEGER NOT NULL,
    render_mode TEXT,
    stage TEXT,
    error TEXT,
    message TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id);
CREATE INDEX IF NOT EXISTS idx_events_url ON events(url);
"#;

/// [`ReportSink`] writing to a SQLite database
pub struct SqliteSink {
    conn: Mutex<Connection>,
    run_id: i64,
}

impl SqliteSink {
    /// Opens (or creates) the database and starts a run record
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `root_url` - Root of the mirrored site
    /// * `config_hash` - Hash of the configuration in effect
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Database ready and run recorded
    /// * `Err(MirrorError)` - Failed to open or initialize the database
    pub fn new(path: &Path, root_url: &str, config_hash: &str) -> Result<Self, MirrorError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        Self::with_connection(conn, root_url, config_hash)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(root_url: &str, config_hash: &str) -> Result<Self, MirrorError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn, root_url, config_hash)
    }

    fn with_connection(conn: Connection, root_url: &str, config_hash: &str) -> Result<Self, MirrorError> {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT INTO runs (root_url, config_hash, started_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![root_url, config_hash, Utc::now().to_rfc3339(), "running"],
        )?;
        let run_id = conn.last_insert_rowid();

        Ok(Self {
            conn: Mutex::new(conn),
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, MirrorError> {
        self.conn
            .lock()
            .map_err(|e| MirrorError::Report(format!("event log lock poisoned: {}", e)))
    }
}

impl ReportSink for SqliteSink {
    fn record(&self, event: &CrawlEvent) -> Result<(), MirrorError> {
        self.conn()?.execute(
            "INSERT INTO events (run_id, recorded_at, kind, url, resource_kind, bytes, elapsed_ms,
                                 render_mode, stage, error, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                self.run_id,
                Utc::now().to_rfc3339(),
                event.kind.as_str(),
                event.url,
                event.resource_kind.map(|k| k.as_str()),
                event.bytes as i64,
                event.elapsed_ms as i64,
                event.render_mode.map(|m| m.as_str()),
                event.stage.map(|s| s.as_str()),
                event.error,
                event.message,
            ],
        )?;
        Ok(())
    }

    fn finish(&self, stats: &CrawlStats, aborted: bool) -> Result<(), MirrorError> {
        let status = if aborted { "aborted" } else { "completed" };
        self.conn()?.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2, succeeded = ?3, failed = ?4,
                             skipped = ?5, total_bytes = ?6
             WHERE id = ?7",
            params![
                Utc::now().to_rfc3339(),
                status,
                stats.total_succeeded() as i64,
                stats.total_failed() as i64,
                stats.total_skipped() as i64,
                stats.total_bytes as i64,
                self.run_id,
            ],
        )?;
        Ok(())
    }
}
