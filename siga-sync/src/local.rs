//! On-device key-value persistence
//!
//! The local store is the durability floor: the engine writes here before a
//! mutation returns, and reads from here on startup. Values are JSON strings.

use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::LocalStoreError;

pub const RESIDENTS_KEY: &str = "siga_residents";
pub const CONFIG_KEY: &str = "siga_config";

/// Synchronous key-value store
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), LocalStoreError>;
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    entries: Mutex<HashMap<String, String>>,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `set` fail, as a full quota would
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let entries = self.entries.lock().map_err(|_| LocalStoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Rejected(key.to_string()));
        }
        let mut entries = self.entries.lock().map_err(|_| LocalStoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// SQLite-backed store, one row per key
pub struct SqliteLocalStore {
    db: Mutex<Connection>,
}

impl SqliteLocalStore {
    /// Open or create the database file at `path`
    pub fn open(path: &Path) -> Result<Self, LocalStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;

        // Enable WAL mode for concurrent read access
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::with_connection(db)?;
        info!(path = %path.display(), "Local store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, LocalStoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self, LocalStoreError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let db = self.db.lock().map_err(|_| LocalStoreError::Poisoned)?;
        let mut stmt = db.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;

        match stmt.query_row([key], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        let db = self.db.lock().map_err(|_| LocalStoreError::Poisoned)?;
        db.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
            rusqlite::params![key, value],
        )?;
        debug!(key, bytes = value.len(), "Saved local entry");
        Ok(())
    }
}
