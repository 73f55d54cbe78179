//! Per-coordinate weather cache over a key-value backend.
//!
//! Reads go to the backend first; misses are filled from the provider and
//! written back with the weather TTL. Backend failures never fail a lookup:
//! the record is fetched directly and simply not cached.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use propsearch_core::{CacheError, KeyValueCache};
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::batcher::WeatherBatcher;
use crate::fetcher::WeatherFetcher;
use crate::types::{Coordinate, WeatherOrigin, WeatherRecord, CACHE_KEY_PREFIX};

pub const DEFAULT_WEATHER_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses answered by a concurrent caller's fetch
    pub coalesced: u64,
    pub backend_errors: u64,
}

pub struct WeatherRecordCache {
    kv: Arc<dyn KeyValueCache>,
    fetcher: Arc<WeatherFetcher>,
    ttl: Duration,
    inflight: Mutex<HashMap<String, Arc<OnceCell<WeatherRecord>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    backend_errors: AtomicU64,
}

impl WeatherRecordCache {
    pub fn new(kv: Arc<dyn KeyValueCache>, fetcher: Arc<WeatherFetcher>, ttl: Duration) -> Self {
        Self {
            kv,
            fetcher,
            ttl,
            inflight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn fetcher(&self) -> &WeatherFetcher {
        &self.fetcher
    }

    /// Cached record for the rounded coordinate, if present and unexpired.
    pub fn get(&self, coordinate: Coordinate) -> Option<WeatherRecord> {
        match self.read(&coordinate.cache_key()) {
            Ok(found) => found,
            Err(e) => {
                self.note_backend_error("read", &e);
                None
            }
        }
    }

    /// Store a record under its rounded coordinate.
    pub fn put(&self, coordinate: Coordinate, record: &WeatherRecord, ttl: Duration) -> Result<(), CacheError> {
        let mut stored = record.clone();
        stored.origin = WeatherOrigin::Live;
        let payload = serde_json::to_string(&stored)?;
        self.kv.set_with_ttl(&coordinate.cache_key(), &payload, ttl)
    }

    /// Cached record, or a fresh one fetched and written back.
    ///
    /// Concurrent misses for the same key share one provider call and its
    /// outcome, fallback included. Fallback records are returned but never
    /// cached, so a recovered provider is picked up on the next lookup.
    pub async fn get_or_fetch(&self, coordinate: Coordinate) -> WeatherRecord {
        match self.read(&coordinate.cache_key()) {
            Ok(Some(record)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                record
            }
            Ok(None) => self.fetch_shared(coordinate).await,
            Err(e) => {
                self.note_backend_error("read", &e);
                self.fetch_shared(coordinate).await
            }
        }
    }

    /// Resolve many coordinates; `output[i]` belongs to `coordinates[i]`.
    ///
    /// Cache hits are answered immediately. Each distinct missing key is
    /// looked up once, through the batcher's paced groups.
    pub async fn get_or_fetch_many(
        &self,
        batcher: &WeatherBatcher,
        coordinates: &[Coordinate],
    ) -> Vec<WeatherRecord> {
        let mut resolved: HashMap<String, WeatherRecord> = HashMap::new();
        let mut missing: Vec<Coordinate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for coordinate in coordinates {
            let key = coordinate.cache_key();
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.read(&key) {
                Ok(Some(record)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    resolved.insert(key, record);
                }
                Ok(None) => missing.push(coordinate.rounded()),
                Err(e) => {
                    self.note_backend_error("read", &e);
                    missing.push(coordinate.rounded());
                }
            }
        }

        if !missing.is_empty() {
            tracing::debug!(
                "Weather lookup: {} cached, {} to fetch",
                resolved.len(),
                missing.len()
            );
            let fetched = batcher
                .run(&missing, |coordinate: &Coordinate| self.fetch_shared(*coordinate))
                .await;
            for (coordinate, record) in missing.iter().zip(fetched) {
                resolved.insert(coordinate.cache_key(), record);
            }
        }

        coordinates
            .iter()
            .map(|c| {
                resolved
                    .get(&c.cache_key())
                    .cloned()
                    .unwrap_or_else(|| WeatherRecord::fallback(Some(*c)))
            })
            .collect()
    }

    /// Drop every weather entry; returns how many were removed.
    pub fn flush(&self) -> Result<usize, CacheError> {
        let removed = self.kv.delete_prefix(CACHE_KEY_PREFIX)?;
        tracing::info!("Flushed {} weather cache entries", removed);
        Ok(removed)
    }

    /// Reclaim space held by expired entries in the backend.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let removed = self.kv.purge_expired()?;
        if removed > 0 {
            tracing::debug!("Purged {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Live weather entries in the backend.
    pub fn len(&self) -> Result<usize, CacheError> {
        self.kv.count_prefix(CACHE_KEY_PREFIX)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> WeatherCacheStats {
        WeatherCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }

    /// Join the key's in-flight lookup, or lead a new one.
    ///
    /// The caller has already seen a miss. Every caller holding the same
    /// cell gets the leader's record.
    async fn fetch_shared(&self, coordinate: Coordinate) -> WeatherRecord {
        let key = coordinate.cache_key();
        let cell = self.inflight.lock().entry(key.clone()).or_default().clone();

        let mut led = false;
        let record = cell
            .get_or_init(|| {
                led = true;
                self.fetch_and_store(coordinate, &key)
            })
            .await
            .clone();

        if led {
            self.release(&key, &cell);
        } else {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        record
    }

    async fn fetch_and_store(&self, coordinate: Coordinate, key: &str) -> WeatherRecord {
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Weather cache miss");
        let record = self.fetcher.fetch_or_default(coordinate).await;
        if !record.is_fallback() {
            if let Err(e) = self.put(coordinate, &record, self.ttl) {
                self.note_backend_error("write", &e);
            }
        }
        record
    }

    fn read(&self, key: &str) -> Result<Option<WeatherRecord>, CacheError> {
        let Some(payload) = self.kv.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<WeatherRecord>(&payload) {
            Ok(mut record) => {
                record.origin = WeatherOrigin::Cached;
                Ok(Some(record))
            }
            Err(e) => {
                tracing::warn!(key = %key, "Discarding unreadable weather cache entry: {}", e);
                let _ = self.kv.delete(key);
                Ok(None)
            }
        }
    }

    fn note_backend_error(&self, operation: &str, error: &CacheError) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("Weather cache {} failed, continuing without cache: {}", operation, error);
    }

    /// Retire a settled cell so later misses start a fresh lookup.
    fn release(&self, key: &str, cell: &Arc<OnceCell<WeatherRecord>>) {
        let mut inflight = self.inflight.lock();
        if inflight.get(key).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            inflight.remove(key);
        }
    }
}
