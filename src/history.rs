//! Chat history persistence
//!
//! Sessions append every chat line and read back the most recent lines
//! when a participant joins. Stores must tolerate concurrent use from
//! many sessions without outside coordination.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::error::StoreError;

/// One persisted chat line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub username: String,
    pub message: String,
}

impl HistoryRecord {
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }
}

/// Append-only message history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist one chat line
    async fn append(&self, username: &str, message: &str) -> Result<(), StoreError>;

    /// Up to `limit` records, most recent first
    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        username   TEXT NOT NULL,
        message    TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
";

/// SQLite-backed history
///
/// rusqlite is blocking, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteHistory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistory {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    /// Private database that lives as long as this store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn append(&self, username: &str, message: &str) -> Result<(), StoreError> {
        let username = username.to_string();
        let message = message.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (username, message) VALUES (?1, ?2)",
                params![username, message],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT username, message FROM messages ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(HistoryRecord {
                    username: row.get(0)?,
                    message: row.get(1)?,
                })
            })?;
            let records = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }
}

/// In-process history, for tests and runs without a database
#[derive(Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, username: &str, message: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.push(HistoryRecord::new(username, message));
        Ok(())
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
