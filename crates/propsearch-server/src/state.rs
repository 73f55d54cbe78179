//! Composition root.
//!
//! Every shared handle (store, key-value cache, weather pipeline, search
//! engine) is built here once and passed to the routes explicitly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::Mutex;
use propsearch_core::{CacheBackend, Config, Environment, KeyValueCache, MemoryCache, SqliteCache};
use propsearch_services::{
    ExpiredEntryPurger, PropertySnapshotCache, PropertyStore, SearchEngine, SqlitePropertyStore,
    WeatherRefresher,
};
use propsearch_weather::retry::{RetryConfig, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS};
use propsearch_weather::{OpenMeteoProvider, WeatherBatcher, WeatherFetcher, WeatherRecordCache, WeatherSource};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub store: Arc<dyn PropertyStore>,
    pub kv: Arc<dyn KeyValueCache>,
    pub environment: Environment,
    started_at: Instant,
    refresher: Option<Arc<WeatherRefresher>>,
    purger: Arc<ExpiredEntryPurger>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Open the configured store and cache and wire up the search pipeline.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = SqlitePropertyStore::open(&config.store.database_path)?;
        if let Some(seed) = &config.store.seed_path {
            store
                .import_seed_file(seed)
                .with_context(|| format!("Failed to import seed file {}", seed.display()))?;
        }

        let kv: Arc<dyn KeyValueCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::Sqlite => Arc::new(SqliteCache::open(&config.cache.path)?),
        };

        let retry = RetryConfig::new(
            config.weather.max_retries,
            DEFAULT_INITIAL_DELAY_MS,
            DEFAULT_MAX_DELAY_MS,
        );
        let provider = OpenMeteoProvider::new(&config.weather.api_url, config.weather.timeout(), retry)
            .context("Failed to build weather provider")?;

        tracing::info!(
            backend = kv.backend_name(),
            weather_api = %config.weather.api_url,
            "Service dependencies ready"
        );
        Ok(Self::from_parts(config, Arc::new(store), kv, Arc::new(provider)))
    }

    /// Wire the pipeline from already-built collaborators.
    pub fn from_parts(
        config: &Config,
        store: Arc<dyn PropertyStore>,
        kv: Arc<dyn KeyValueCache>,
        source: Arc<dyn WeatherSource>,
    ) -> Self {
        // Each attempt has the HTTP timeout; the whole lookup covers retries.
        let attempts = config.weather.max_retries.saturating_add(1);
        let lookup_timeout = config.weather.timeout().saturating_mul(attempts)
            + Duration::from_millis(DEFAULT_MAX_DELAY_MS);
        let fetcher = Arc::new(WeatherFetcher::new(source).with_timeout(lookup_timeout));
        let weather = Arc::new(WeatherRecordCache::new(
            kv.clone(),
            fetcher,
            config.cache.weather_ttl(),
        ));
        let batcher = WeatherBatcher::new(config.weather.batch_size, config.weather.batch_delay());
        let snapshot = Arc::new(PropertySnapshotCache::new(
            store.clone(),
            config.cache.property_ttl(),
        ));

        let refresher = (config.weather.refresh_minutes > 0).then(|| {
            Arc::new(WeatherRefresher::new(
                snapshot.clone(),
                weather.clone(),
                batcher.clone(),
                Duration::from_secs(u64::from(config.weather.refresh_minutes) * 60),
            ))
        });

        // Purge once per weather TTL, at most once a minute.
        let purger = Arc::new(ExpiredEntryPurger::new(
            weather.clone(),
            config.cache.weather_ttl().max(Duration::from_secs(60)),
        ));

        let engine = Arc::new(SearchEngine::new(
            snapshot,
            weather,
            batcher,
            config.search.clone(),
        ));

        Self {
            engine,
            store,
            kv,
            environment: config.server.environment,
            started_at: Instant::now(),
            refresher,
            purger,
            tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Load the snapshot ahead of the first request. Failure is logged, not
    /// fatal: the first search retries the load.
    pub async fn warm_up(&self) {
        match self.engine.snapshot().get().await {
            Ok(snapshot) => tracing::info!("Snapshot warmed with {} properties", snapshot.records.len()),
            Err(e) => tracing::warn!("Snapshot warm-up failed: {}", e),
        }
    }

    /// Start the expired-entry purger, and the weather refresher if one is
    /// configured.
    pub fn start_background(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(self.purger.clone().spawn(self.shutdown.child_token()));
        if let Some(refresher) = &self.refresher {
            tasks.push(refresher.clone().spawn(self.shutdown.child_token()));
        }
    }

    /// Stop background work and wait for it to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
        tracing::info!("Background tasks stopped");
    }
}
