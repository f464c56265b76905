//! # Storage
//!
//! ## Responsibility
//! A small synchronous key-value interface standing in for browser
//! `localStorage`. The cache, the persistent user id and the bearer token are
//! all read and written through it, so tests substitute [`MemoryStorage`] and
//! the CLI uses [`SqliteStorage`].
//!
//! ## Guarantees
//! - Values are opaque strings; callers own the encoding
//! - `remove` of a missing key is not an error
//! - Writes are last-write-wins across handles sharing one SQLite file

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;

/// Key-value persistence backend.
pub trait Storage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<T: Storage + ?Sized> Storage for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-memory backend with an optional byte quota.
///
/// The quota counts key and value bytes across all entries, the way browsers
/// account `localStorage`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    quota_bytes: Option<usize>,
    read_only: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        MemoryStorage { quota_bytes: Some(quota_bytes), ..Self::default() }
    }

    /// A backend that rejects every write, like storage in private browsing.
    pub fn read_only() -> Self {
        MemoryStorage { read_only: true, ..Self::default() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        if let Some(limit) = self.quota_bytes {
            let needed = self.used_bytes_excluding(key) + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded { key: key.to_string(), needed, limit });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteStorage
// ---------------------------------------------------------------------------

/// Durable backend: a single `kv` table in a SQLite database.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
        )?;
        Ok(SqliteStorage { conn })
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_get_remove() {
        let mut s = MemoryStorage::new();
        assert_eq!(s.get("k").expect("get"), None);
        s.set("k", "v").expect("set");
        assert_eq!(s.get("k").expect("get").as_deref(), Some("v"));
        s.remove("k").expect("remove");
        assert_eq!(s.get("k").expect("get"), None);
    }

    #[test]
    fn test_memory_remove_missing_is_ok() {
        let mut s = MemoryStorage::new();
        assert!(s.remove("nothing").is_ok());
    }

    #[test]
    fn test_memory_quota_rejects_oversized_write() {
        let mut s = MemoryStorage::with_quota(8);
        s.set("k", "1234").expect("fits");
        let err = s.set("k2", "123456").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_memory_quota_allows_overwrite_of_same_key() {
        let mut s = MemoryStorage::with_quota(6);
        s.set("k", "12345").expect("fits");
        s.set("k", "abcde").expect("overwrite does not double count");
        assert_eq!(s.get("k").expect("get").as_deref(), Some("abcde"));
    }

    #[test]
    fn test_memory_read_only_rejects_writes() {
        let mut s = MemoryStorage::read_only();
        assert!(matches!(s.set("k", "v"), Err(StorageError::ReadOnly)));
        assert!(matches!(s.remove("k"), Err(StorageError::ReadOnly)));
        assert_eq!(s.get("k").expect("get"), None);
    }

    #[test]
    fn test_sqlite_in_memory_roundtrip() {
        let mut s = SqliteStorage::in_memory().expect("open");
        s.set("chat_user_id", "abc").expect("set");
        s.set("chat_user_id", "def").expect("upsert");
        assert_eq!(s.get("chat_user_id").expect("get").as_deref(), Some("def"));
        s.remove("chat_user_id").expect("remove");
        assert_eq!(s.get("chat_user_id").expect("get"), None);
    }

    #[test]
    fn test_sqlite_file_persists_across_handles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chat.db");
        {
            let mut s = SqliteStorage::open(&path).expect("open");
            s.set("access_token", "t0k3n").expect("set");
        }
        let s = SqliteStorage::open(&path).expect("reopen");
        assert_eq!(s.get("access_token").expect("get").as_deref(), Some("t0k3n"));
    }

    #[test]
    fn test_boxed_storage_delegates() {
        let mut s: Box<dyn Storage> = Box::new(MemoryStorage::new());
        s.set("a", "b").expect("set");
        assert_eq!(s.get("a").expect("get").as_deref(), Some("b"));
    }
}
