//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A raw record as persisted, before any TTL check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
  pub payload: Vec<u8>,
  pub written_at: DateTime<Utc>,
}

/// Key-value persistence surface for the TTL cache.
///
/// Storage knows nothing about expiry; the cache layer decides what is valid.
pub trait CacheStorage: Send + Sync {
  fn read(&self, key: &str) -> Result<Option<StoredRecord>>;

  /// Overwrite the record for `key`.
  fn write(&self, key: &str, description: &str, payload: &[u8], written_at: DateTime<Utc>)
    -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;

  /// Drop every record, returning how many were removed.
  fn clear(&self) -> Result<usize>;
}

impl<S: CacheStorage + ?Sized> CacheStorage for std::sync::Arc<S> {
  fn read(&self, key: &str) -> Result<Option<StoredRecord>> {
    (**self).read(key)
  }

  fn write(&self, key: &str, description: &str, payload: &[u8], written_at: DateTime<Utc>)
    -> Result<()> {
    (**self).write(key, description, payload, written_at)
  }

  fn remove(&self, key: &str) -> Result<()> {
    (**self).remove(key)
  }

  fn clear(&self) -> Result<usize> {
    (**self).clear()
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn read(&self, _key: &str) -> Result<Option<StoredRecord>> {
    Ok(None) // Always miss
  }

  fn write(&self, _key: &str, _description: &str, _payload: &[u8], _at: DateTime<Utc>) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
      .ok_or_else(|| eyre!("Could not determine cache directory"))?;

    Ok(cache_dir.join("dontforget").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per remote call signature
CREATE TABLE IF NOT EXISTS call_cache (
    call_key TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    payload BLOB NOT NULL,
    written_at TEXT NOT NULL
);
"#;

impl CacheStorage for SqliteStorage {
  fn read(&self, key: &str) -> Result<Option<StoredRecord>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT payload, written_at FROM call_cache WHERE call_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache record: {}", e))?;

    match row {
      Some((payload, written_at)) => Ok(Some(StoredRecord {
        payload,
        written_at: parse_datetime(&written_at)?,
      })),
      None => Ok(None),
    }
  }

  fn write(
    &self,
    key: &str,
    description: &str,
    payload: &[u8],
    written_at: DateTime<Utc>,
  ) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO call_cache (call_key, description, payload, written_at)
         VALUES (?, ?, ?, ?)",
        params![key, description, payload, written_at.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to store cache record: {}", e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM call_cache WHERE call_key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove cache record: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM call_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// In-memory storage for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
  records: Mutex<std::collections::HashMap<String, StoredRecord>>,
}

#[cfg(test)]
impl MemoryStorage {
  /// Put a raw payload in place, bypassing the cache layer.
  pub fn insert_raw(&self, key: &str, payload: &[u8], written_at: DateTime<Utc>) {
    self.records.lock().unwrap().insert(
      key.to_string(),
      StoredRecord {
        payload: payload.to_vec(),
        written_at,
      },
    );
  }

  pub fn len(&self) -> usize {
    self.records.lock().unwrap().len()
  }
}

#[cfg(test)]
impl CacheStorage for MemoryStorage {
  fn read(&self, key: &str) -> Result<Option<StoredRecord>> {
    Ok(self.records.lock().unwrap().get(key).cloned())
  }

  fn write(&self, key: &str, _description: &str, payload: &[u8], written_at: DateTime<Utc>) -> Result<()> {
    self.insert_raw(key, payload, written_at);
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.records.lock().unwrap().remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<usize> {
    let mut records = self.records.lock().unwrap();
    let count = records.len();
    records.clear();
    Ok(count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn open_temp() -> (tempfile::TempDir, SqliteStorage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open_at(&dir.path().join("nested").join("cache.db")).unwrap();
    (dir, storage)
  }

  #[test]
  fn test_sqlite_roundtrip_keeps_timestamp() {
    let (_dir, storage) = open_temp();
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    storage.write("k", "desc", b"payload", at).unwrap();
    let record = storage.read("k").unwrap().unwrap();
    assert_eq!(record.payload, b"payload");
    assert_eq!(record.written_at, at);

    assert!(storage.read("missing").unwrap().is_none());
  }

  #[test]
  fn test_sqlite_write_overwrites() {
    let (_dir, storage) = open_temp();
    let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

    storage.write("k", "desc", b"old", first).unwrap();
    storage.write("k", "desc", b"new", second).unwrap();

    let record = storage.read("k").unwrap().unwrap();
    assert_eq!(record.payload, b"new");
    assert_eq!(record.written_at, second);
  }

  #[test]
  fn test_sqlite_remove_and_clear() {
    let (_dir, storage) = open_temp();
    let at = Utc::now();
    storage.write("a", "a", b"1", at).unwrap();
    storage.write("b", "b", b"2", at).unwrap();
    storage.write("c", "c", b"3", at).unwrap();

    storage.remove("a").unwrap();
    assert!(storage.read("a").unwrap().is_none());
    assert_eq!(storage.clear().unwrap(), 2);
    assert!(storage.read("b").unwrap().is_none());
  }

  #[test]
  fn test_sqlite_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let at = Utc.with_ymd_and_hms(2024, 5, 5, 5, 5, 5).unwrap();

    SqliteStorage::open_at(&path)
      .unwrap()
      .write("k", "desc", b"kept", at)
      .unwrap();

    let reopened = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(reopened.read("k").unwrap().unwrap().payload, b"kept");
  }

  #[test]
  fn test_noop_storage_never_hits() {
    let storage = NoopStorage;
    storage.write("k", "d", b"x", Utc::now()).unwrap();
    assert!(storage.read("k").unwrap().is_none());
  }
}
