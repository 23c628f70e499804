//! Conversation storage.
//!
//! Provides SQLite-backed storage for the chat transcript with:
//! - Ordered, role-tagged messages
//! - A hard cap on retained history (oldest entries dropped on every append)
//! - Rollback of the trailing entry after a failed send

use rusqlite::{Connection, Result as SqlResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Capped, persistent conversation log.
///
/// The cap is enforced after every append; history never exceeds it.
pub struct ConversationStore {
    conn: Connection,
    cap: usize,
}

impl ConversationStore {
    /// Open or create the conversation database at `path`.
    ///
    /// A corrupt or unreadable file is treated as "no history": the file is
    /// removed and recreated empty.
    pub fn open<P: AsRef<Path>>(path: P, cap: usize) -> SqlResult<Self> {
        let path = path.as_ref();
        match Self::try_open(path, cap) {
            Ok(store) => Ok(store),
            Err(e) => {
                tracing::warn!("conversation store unreadable ({}), starting empty", e);
                let _ = std::fs::remove_file(path);
                Self::try_open(path, cap)
            }
        }
    }

    /// Create an in-memory store (for testing and ephemeral sessions).
    pub fn in_memory(cap: usize) -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, cap };
        store.init_schema()?;
        Ok(store)
    }

    fn try_open(path: &Path, cap: usize) -> SqlResult<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        let store = Self { conn, cap };
        store.init_schema()?;
        // Probe the table so a corrupt file fails here, not on first append.
        store.len()?;
        Ok(store)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                role TEXT NOT NULL CHECK (role IN ('system', 'user', 'assistant')),
                content TEXT NOT NULL
            );
            "#,
        )
    }

    /// Append one message and persist, truncating to the newest `cap` entries.
    pub fn append(&self, role: Role, content: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO messages (role, content) VALUES (?1, ?2)",
            [&role.to_string(), content],
        )?;
        self.truncate_to_cap()
    }

    fn truncate_to_cap(&self) -> SqlResult<()> {
        self.conn.execute(
            "DELETE FROM messages WHERE seq NOT IN (
                SELECT seq FROM messages ORDER BY seq DESC LIMIT ?1
            )",
            [self.cap as i64],
        )?;
        Ok(())
    }

    /// The capped history, oldest first.
    pub fn history(&self) -> SqlResult<Vec<Message>> {
        let mut stmt = self
            .conn
            .prepare("SELECT role, content FROM messages ORDER BY seq ASC")?;

        let messages = stmt.query_map([], |row| {
            let role_str: String = row.get(0)?;
            Ok(Message {
                role: role_str.parse().unwrap_or(Role::User),
                content: row.get(1)?,
            })
        })?;

        messages.collect()
    }

    /// Number of stored messages.
    pub fn len(&self) -> SqlResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> SqlResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove exactly the trailing entry (rollback after a failed send).
    pub fn remove_last(&self) -> SqlResult<bool> {
        let rows = self.conn.execute(
            "DELETE FROM messages WHERE seq = (SELECT MAX(seq) FROM messages)",
            [],
        )?;
        Ok(rows > 0)
    }

    /// Empty the log and drop the persisted rows.
    pub fn clear(&self) -> SqlResult<()> {
        self.conn.execute("DELETE FROM messages", [])?;
        Ok(())
    }
}
