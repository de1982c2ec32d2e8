//! Persistence port - key/value blobs for console state
//!
//! Every component persists JSON snapshots through `KvStore`. Writes are
//! synchronous and happen on every mutation; there is no batching.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::time::now_iso8601;

/// Narrow key/value persistence used by the log, saved commands and batch state
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and decode a JSON value.
///
/// A value that no longer decodes is treated as absent so one corrupt
/// snapshot cannot wedge the console.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(
                component = "store",
                event = "store.decode_failed",
                key = %key,
                error = %e,
                "Ignoring undecodable snapshot"
            );
            Ok(None)
        }
    }
}

/// Encode and write a JSON value
pub fn put_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw)
}

/// Persisted key layout, namespaced under `console:`
pub mod keys {
    use crate::batch::OsTarget;

    pub const PREFIX: &str = "console:";

    pub fn log(server_id: &str) -> String {
        format!("{PREFIX}log:{server_id}")
    }

    pub fn commands(server_id: &str) -> String {
        format!("{PREFIX}commands:{server_id}")
    }

    pub fn batch(server_id: &str) -> String {
        format!("{PREFIX}batch:{server_id}")
    }

    pub fn favorites(os: OsTarget) -> String {
        format!("{PREFIX}favorites:{}", os.as_str())
    }

    pub fn active_server() -> String {
        format!("{PREFIX}active_server")
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store for tests and throwaway runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed store, one row per key
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // Set up connection for concurrent access
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now_iso8601()],
        )?;
        debug!(
            component = "store",
            event = "store.put",
            key = %key,
            bytes = value.len(),
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("a").unwrap(), None);
        store.put("a", "1").unwrap();
        store.put("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        // Deleting a missing key is fine
        store.delete("a").unwrap();
    }

    #[test]
    fn memory_store_get_put_delete() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn sqlite_store_get_put_delete() {
        exercise(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            put_json(&store, &keys::log("pz-01"), &vec!["one", "two"]).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let restored: Option<Vec<String>> = get_json(&store, &keys::log("pz-01")).unwrap();
        assert_eq!(restored, Some(vec!["one".to_string(), "two".to_string()]));
    }

    #[test]
    fn undecodable_snapshot_reads_as_absent() {
        let store = MemoryStore::new();
        store.put("console:log:x", "{not json").unwrap();
        let value: Option<Vec<String>> = get_json(&store, "console:log:x").unwrap();
        assert!(value.is_none());
    }
}
