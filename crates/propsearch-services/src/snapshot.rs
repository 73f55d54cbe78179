//! Versioned, time-bounded copy of all active properties.
//!
//! Reads are served from memory while the snapshot is fresh. An expired or
//! invalidated snapshot is reloaded from the store by exactly one caller;
//! everyone else arriving during the reload waits for it and shares the
//! result, failures included.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use propsearch_core::StoreError;
use serde::Serialize;

use crate::property::PropertyRecord;
use crate::store::PropertyStore;

pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);

struct Snapshot {
    records: Arc<Vec<PropertyRecord>>,
    version: u64,
    epoch: u64,
    loaded_at: Instant,
    loaded_at_utc: DateTime<Utc>,
}

/// A caller's view of the snapshot.
#[derive(Debug, Clone)]
pub struct PropertySnapshot {
    pub records: Arc<Vec<PropertyRecord>>,
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub age: Duration,
    /// Whether this call performed the store reload.
    pub reloaded: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub version: u64,
    pub record_count: usize,
    pub age_secs: Option<u64>,
    pub ttl_secs: u64,
    pub hits: u64,
    pub reloads: u64,
    pub reload_failures: u64,
}

pub struct PropertySnapshotCache {
    store: Arc<dyn PropertyStore>,
    ttl: Duration,
    current: RwLock<Option<Snapshot>>,
    reload_lock: tokio::sync::Mutex<()>,
    /// Completed reload attempts, successful or not.
    attempts: AtomicU64,
    /// Error of the latest attempt, tagged with its attempt number.
    last_failure: Mutex<Option<(u64, StoreError)>>,
    epoch: AtomicU64,
    next_version: AtomicU64,
    hits: AtomicU64,
    reloads: AtomicU64,
    reload_failures: AtomicU64,
}

impl PropertySnapshotCache {
    pub fn new(store: Arc<dyn PropertyStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            current: RwLock::new(None),
            reload_lock: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_failure: Mutex::new(None),
            epoch: AtomicU64::new(0),
            next_version: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            reload_failures: AtomicU64::new(0),
        }
    }

    /// Current snapshot, reloading from the store if cold, expired or
    /// invalidated.
    ///
    /// # Errors
    /// Returns the store error when a needed reload fails. Callers that
    /// were waiting on that reload get the same error without retrying it.
    /// No partial snapshot is ever installed.
    pub async fn get(&self) -> Result<PropertySnapshot, StoreError> {
        if let Some(view) = self.fresh_view() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(view);
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let _reload = self.reload_lock.lock().await;

        // The reload we waited on may already have refreshed it.
        if let Some(view) = self.fresh_view() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(view);
        }
        if let Some((attempt, e)) = self.last_failure.lock().as_ref() {
            if *attempt > seen {
                return Err(e.clone());
            }
        }

        self.reload_locked().await
    }

    /// Force the next `get()` to reload.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.current.write().take();
        tracing::info!("Property snapshot invalidated");
    }

    /// Invalidate and reload immediately.
    pub async fn reload(&self) -> Result<PropertySnapshot, StoreError> {
        self.invalidate();
        self.get().await
    }

    /// Current snapshot without triggering a reload, fresh or not.
    pub fn peek(&self) -> Option<PropertySnapshot> {
        self.current.read().as_ref().map(|s| Self::view(s, false))
    }

    pub fn stats(&self) -> SnapshotStats {
        let current = self.current.read();
        SnapshotStats {
            version: current.as_ref().map_or(0, |s| s.version),
            record_count: current.as_ref().map_or(0, |s| s.records.len()),
            age_secs: current.as_ref().map(|s| s.loaded_at.elapsed().as_secs()),
            ttl_secs: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
        }
    }

    fn fresh_view(&self) -> Option<PropertySnapshot> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let current = self.current.read();
        current
            .as_ref()
            .filter(|s| s.epoch == epoch && s.loaded_at.elapsed() < self.ttl)
            .map(|s| Self::view(s, false))
    }

    fn view(snapshot: &Snapshot, reloaded: bool) -> PropertySnapshot {
        PropertySnapshot {
            records: Arc::clone(&snapshot.records),
            version: snapshot.version,
            loaded_at: snapshot.loaded_at_utc,
            age: snapshot.loaded_at.elapsed(),
            reloaded,
        }
    }

    /// Caller must hold `reload_lock`.
    async fn reload_locked(&self) -> Result<PropertySnapshot, StoreError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let started = Instant::now();
        tracing::info!("Reloading property snapshot from store");

        let store = Arc::clone(&self.store);
        let loaded = tokio::task::spawn_blocking(move || store.find_active_properties())
            .await
            .map_err(|e| StoreError::Unavailable(format!("reload task failed: {}", e)))
            .and_then(|result| result);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let records = match loaded {
            Ok(records) => records,
            Err(e) => {
                self.reload_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Property snapshot reload failed: {}", e);
                *self.last_failure.lock() = Some((attempt, e.clone()));
                return Err(e);
            }
        };
        self.last_failure.lock().take();

        let snapshot = Snapshot {
            records: Arc::new(records),
            version: self.next_version.fetch_add(1, Ordering::SeqCst),
            epoch,
            loaded_at: Instant::now(),
            loaded_at_utc: Utc::now(),
        };
        let view = Self::view(&snapshot, true);

        tracing::info!(
            version = snapshot.version,
            records = snapshot.records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Property snapshot loaded"
        );

        self.reloads.fetch_add(1, Ordering::Relaxed);
        *self.current.write() = Some(snapshot);
        Ok(view)
    }
}
