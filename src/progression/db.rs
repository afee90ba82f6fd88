//! SQLite database connection and schema management
//!
//! One database holds the authored node tree, completion records, the XP
//! ledger and the per-learner gamification projection.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, TransactionBehavior};

/// Wait this long for another connection's write lock before failing with SQLITE_BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared database handle
#[derive(Clone)]
pub struct EngineDb {
    conn: Arc<Mutex<Connection>>,
}

impl EngineDb {
    /// Open or create the database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create db dir: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open progress db: {}", path.display()))?;

        // WAL lets the reconciliation checker read while completions are written
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Lock the connection. A poisoned lock still holds a usable connection:
    /// every write runs inside a transaction that rolled back when the panic unwound.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside one IMMEDIATE transaction, committing on `Ok`.
    ///
    /// IMMEDIATE takes the write lock up front, so two connections can never
    /// both read a pre-write snapshot and then race to write.
    pub fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` inside a read transaction so all reads see one snapshot
    pub fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&*tx)?;
        tx.finish()?;
        Ok(value)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA_SQL)?;
        drop(conn);
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .unwrap_or(0);

        // Migration 2: reconciliation reports
        if version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS drift_reports (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id TEXT NOT NULL,
                    learner_id TEXT NOT NULL,
                    cached_total INTEGER NOT NULL,
                    ledger_total INTEGER NOT NULL,
                    delta INTEGER NOT NULL,
                    cached_level INTEGER NOT NULL,
                    expected_level INTEGER NOT NULL,
                    formula_version TEXT NOT NULL,
                    checked_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_drift_learner ON drift_reports(learner_id);
                CREATE INDEX IF NOT EXISTS idx_drift_run ON drift_reports(run_id);
                "#,
            )?;
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
        }

        Ok(())
    }
}

/// Base schema (version 1)
const SCHEMA_SQL: &str = r#"
-- Authored content tree (read-only to the engine outside of catalog import)
CREATE TABLE IF NOT EXISTS progress_nodes (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    parent_id TEXT REFERENCES progress_nodes(id),
    order_index INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    unlock_rule TEXT NOT NULL,
    content_kind TEXT,
    UNIQUE (parent_id, order_index)
);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON progress_nodes(parent_id);

-- One row per learner and completed node
CREATE TABLE IF NOT EXISTS completion_records (
    learner_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    first_completed_at INTEGER NOT NULL,
    completed_at INTEGER NOT NULL,
    payload TEXT,
    PRIMARY KEY (learner_id, node_id)
);

-- Append-only XP ledger; dedup_key is NULL only for admin adjustments
CREATE TABLE IF NOT EXISTS xp_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    learner_id TEXT NOT NULL,
    node_id TEXT,
    reason_code TEXT NOT NULL,
    amount INTEGER NOT NULL,
    dedup_key TEXT UNIQUE,
    actor_id TEXT,
    note TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_xp_learner ON xp_events(learner_id);

-- Per-learner projection of the ledger plus streak state
CREATE TABLE IF NOT EXISTS gamification_state (
    learner_id TEXT PRIMARY KEY,
    total_xp INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 1,
    current_streak INTEGER NOT NULL DEFAULT 0,
    longest_streak INTEGER NOT NULL DEFAULT 0,
    last_active_day TEXT,
    streak_started_day TEXT,
    timezone TEXT,
    formula_version TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT 0,
    CHECK (current_streak <= longest_streak)
);

CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (1);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_and_init() {
        let dir = tempdir().unwrap();
        let db = EngineDb::open(&dir.path().join("progress.db")).unwrap();

        let conn = db.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "progress_nodes",
            "completion_records",
            "xp_events",
            "gamification_state",
            "drift_reports",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.db");
        drop(EngineDb::open(&path).unwrap());
        let db = EngineDb::open(&path).unwrap();
        let version: i32 = db
            .conn()
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_dedup_key_is_unique_but_nullable() {
        let dir = tempdir().unwrap();
        let db = EngineDb::open(&dir.path().join("progress.db")).unwrap();
        let conn = db.conn();
        let insert = "INSERT INTO xp_events (learner_id, reason_code, amount, dedup_key, created_at)
                      VALUES ('l1', 'admin-adjustment', 5, ?1, 0)";
        conn.execute(insert, [None::<String>]).unwrap();
        conn.execute(insert, [None::<String>]).unwrap();
        conn.execute(insert, [Some("k")]).unwrap();
        assert!(conn.execute(insert, [Some("k")]).is_err());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempdir().unwrap();
        let db = EngineDb::open(&dir.path().join("progress.db")).unwrap();
        let result: std::result::Result<(), rusqlite::Error> = db.write(|conn| {
            conn.execute(
                "INSERT INTO xp_events (learner_id, reason_code, amount, dedup_key, created_at)
                 VALUES ('l1', 'completion', 10, 'dup', 0)",
                [],
            )?;
            conn.execute(
                "INSERT INTO xp_events (learner_id, reason_code, amount, dedup_key, created_at)
                 VALUES ('l1', 'completion', 10, 'dup', 0)",
                [],
            )?;
            Ok(())
        });
        assert!(result.is_err());
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM xp_events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
