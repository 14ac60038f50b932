//! SQLite-backed device storage for the session slots.
//!
//! Tables:
//! - `kv`: key, value, updated_at
//!
//! Connection access is serialized behind a mutex; every call runs on the
//! blocking pool so the async caller only suspends.

use super::{KeyValueStore, StorageError, StoreKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// SQLite key/value store.
pub struct SqliteStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the session database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for crash safety across app kills
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;

        tracing::debug!(path = %db_path.display(), "Session store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path.to_path_buf(),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?;
        Ok(result?)
    }

    /// Last write time of a slot (Unix seconds).
    pub async fn updated_at(&self, key: StoreKey) -> Result<Option<i64>, StorageError> {
        self.with_conn(move |conn| {
            match conn.query_row(
                "SELECT updated_at FROM kv WHERE key = ?1",
                rusqlite::params![key.as_str()],
                |row| row.get(0),
            ) {
                Ok(ts) => Ok(Some(ts)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StorageError> {
        self.with_conn(move |conn| {
            match conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![key.as_str()],
                |row| row.get(0),
            ) {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StorageError> {
        let value = value.to_string();
        let now = epoch_secs();
        // Same-value writes leave the row (including updated_at) untouched.
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                 WHERE kv.value <> excluded.value",
                rusqlite::params![key.as_str(), value, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: StoreKey) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM kv WHERE key = ?1",
                rusqlite::params![key.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

// ── Tests ───────────────────────────────────────────────────────────
