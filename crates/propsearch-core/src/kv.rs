//! Generic key-value cache with per-entry TTL.
//!
//! `KeyValueCache` is the collaborator interface both caching layers sit on.
//! Two backends are provided: an in-process map and an SQLite table that
//! survives restarts.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CacheError, RusqliteErrorExt};

pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value store with expiring entries.
///
/// An expired entry behaves exactly like an absent one.
pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Returns true if an entry was removed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove every entry whose key starts with `prefix`; returns the count.
    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Number of live entries under `prefix`.
    fn count_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Drop expired entries; returns how many were removed.
    ///
    /// Reads already ignore expired entries, this only reclaims space.
    fn purge_expired(&self) -> CacheResult<usize>;

    /// Cheap reachability check for health endpoints.
    fn ping(&self) -> CacheResult<()>;

    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process cache backend.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.lock().insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }

    fn count_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at > now)
            .count())
    }

    fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok(before - entries.len())
    }

    fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// SQLite-backed cache backend.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) a cache database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_kv_cache_expires ON kv_cache(expires_at);
            "#,
        )?;
        Ok(())
    }
}

fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

impl KeyValueCache for SqliteCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM kv_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get(0),
            )
            .optional()
            .map_err(RusqliteErrorExt::into_cache_error)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO kv_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )
            .map_err(RusqliteErrorExt::into_cache_error)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM kv_cache WHERE key = ?1", params![key])
            .map_err(RusqliteErrorExt::into_cache_error)?;
        Ok(removed > 0)
    }

    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM kv_cache WHERE key LIKE ?1 ESCAPE '\\'",
                params![like_prefix(prefix)],
            )
            .map_err(RusqliteErrorExt::into_cache_error)
    }

    fn count_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let now = Utc::now().timestamp_millis();
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM kv_cache WHERE key LIKE ?1 ESCAPE '\\' AND expires_at > ?2",
                params![like_prefix(prefix), now],
                |row| row.get(0),
            )
            .map_err(RusqliteErrorExt::into_cache_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn purge_expired(&self) -> CacheResult<usize> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .lock()
            .execute("DELETE FROM kv_cache WHERE expires_at <= ?1", params![now])
            .map_err(RusqliteErrorExt::into_cache_error)
    }

    fn ping(&self) -> CacheResult<()> {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(RusqliteErrorExt::into_cache_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
