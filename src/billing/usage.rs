//! Per-session usage counters.
//!
//! SQLite-backed so counts survive gateway restarts. The server is the sole
//! source of truth for these numbers; clients only ever see the reported
//! remainder.

use chrono::Utc;
use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;

pub struct UsageDb {
    conn: Connection,
}

impl UsageDb {
    /// Open or create the usage database.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS usage (
                session_id TEXT PRIMARY KEY,
                messages_used INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            "#,
        )
    }

    /// Messages consumed by a session so far.
    pub fn messages_used(&self, session_id: &str) -> SqlResult<u32> {
        let mut stmt = self
            .conn
            .prepare("SELECT messages_used FROM usage WHERE session_id = ?1")?;
        let mut rows = stmt.query([session_id])?;

        match rows.next()? {
            Some(row) => {
                let used: i64 = row.get(0)?;
                Ok(used as u32)
            }
            None => Ok(0),
        }
    }

    /// Record one consumed message and return the new total.
    pub fn record_message(&self, session_id: &str) -> SqlResult<u32> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO usage (session_id, messages_used, updated_at)
             VALUES (?1, 1, ?2)
             ON CONFLICT(session_id)
             DO UPDATE SET messages_used = messages_used + 1, updated_at = ?2",
            [session_id, &now],
        )?;
        self.messages_used(session_id)
    }

    /// Reset a session's counter (new billing period).
    pub fn reset(&self, session_id: &str) -> SqlResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE usage SET messages_used = 0, updated_at = ?2 WHERE session_id = ?1",
            [session_id, &now],
        )?;
        Ok(())
    }
}
