use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::application::errors::StorageError;
use crate::domain::traits::VariableStore;

/// SQLite-backed variable store.
///
/// A rusqlite connection is not `Sync`, so access goes through a mutex; each
/// statement runs in SQLite's own implicit transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_tables()?;
        tracing::info!("Variable store opened at {}", path.display());
        Ok(store)
    }

    /// Open an existing database without write access; every `set` fails
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        tracing::info!("Variable store opened read-only at {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS variables (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;
        Ok(())
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let mut stmt = conn.prepare("SELECT key FROM variables ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }
}

impl VariableStore for SqliteStore {
    fn try_get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM variables WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;

        // Rows written by other tools may hold plain text rather than JSON
        Ok(raw.map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw))))
    }

    fn set(&self, key: &str, value: Value) -> Result<Value, StorageError> {
        let encoded = serde_json::to_string(&value)?;
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "INSERT INTO variables (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, encoded],
        )?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let rows = conn.execute("DELETE FROM variables WHERE key = ?1", [key])?;
        Ok(rows > 0)
    }
}
