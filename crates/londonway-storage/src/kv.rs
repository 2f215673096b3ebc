//! Key-value persistence capability.
//!
//! The chat session never touches storage directly; it is handed a
//! [`KeyValueStore`] so tests can swap SQLite for [`MemoryStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use londonway_core::error::LondonWayError;

use crate::db::Database;

/// String-keyed persistent store.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, LondonWayError>;

    /// Insert or replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), LondonWayError>;

    /// Delete `key`. Returns whether a value was present.
    fn remove(&self, key: &str) -> Result<bool, LondonWayError>;
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, LondonWayError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LondonWayError::Storage(format!("Failed to read key {}: {}", key, e)))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LondonWayError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![key, value],
            )
            .map_err(|e| LondonWayError::Storage(format!("Failed to write key {}: {}", key, e)))?;
            debug!(key, bytes = value.len(), "kv value written");
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<bool, LondonWayError> {
        self.with_conn(|conn| {
            let affected = conn
                .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                .map_err(|e| {
                    LondonWayError::Storage(format!("Failed to delete key {}: {}", key, e))
                })?;
            Ok(affected > 0)
        })
    }
}

/// Process-local store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, LondonWayError> {
        self.entries
            .lock()
            .map_err(|e| LondonWayError::Storage(format!("Memory store lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, LondonWayError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LondonWayError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, LondonWayError> {
        Ok(self.lock()?.remove(key).is_some())
    }
}
