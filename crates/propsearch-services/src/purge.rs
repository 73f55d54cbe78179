//! Periodic removal of expired weather cache entries.
//!
//! Expired entries are already invisible to reads; without this task they
//! would only leave the backend when the same key is read again.

use std::sync::Arc;
use std::time::Duration;

use propsearch_weather::WeatherRecordCache;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ExpiredEntryPurger {
    weather: Arc<WeatherRecordCache>,
    interval: Duration,
}

impl ExpiredEntryPurger {
    pub fn new(weather: Arc<WeatherRecordCache>, interval: Duration) -> Self {
        Self { weather, interval }
    }

    /// One purge pass; backend failures are logged and counted as zero.
    pub fn purge_once(&self) -> usize {
        match self.weather.purge_expired() {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Expired cache entry purge failed: {}", e);
                0
            }
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::debug!("Cache purger started (every {:?})", self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.purge_once();
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use async_trait::async_trait;
    use propsearch_core::{KeyValueCache, MemoryCache};
    use propsearch_weather::{Coordinate, CurrentConditions, WeatherError, WeatherFetcher, WeatherSource};

    use super::*;

    struct Mild;

    #[async_trait]
    impl WeatherSource for Mild {
        async fn fetch_current(&self, _coordinate: Coordinate) -> Result<CurrentConditions, WeatherError> {
            Ok(CurrentConditions {
                temperature: 21.0,
                humidity: 50.0,
                weather_code: 1,
            })
        }

        fn name(&self) -> &'static str {
            "mild"
        }
    }

    fn weather_cache(kv: Arc<MemoryCache>, ttl: Duration) -> Arc<WeatherRecordCache> {
        Arc::new(WeatherRecordCache::new(
            kv,
            Arc::new(WeatherFetcher::new(Arc::new(Mild))),
            ttl,
        ))
    }

    #[tokio::test]
    async fn test_purge_once_drops_only_expired_entries() {
        let kv = Arc::new(MemoryCache::new());
        let weather = weather_cache(kv.clone(), Duration::from_millis(20));
        weather.get_or_fetch(Coordinate::new(1.0, 1.0)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        kv.set_with_ttl("weather:keep", "{}", Duration::from_secs(60)).unwrap();

        let purger = ExpiredEntryPurger::new(weather, Duration::from_secs(60));

        assert_eq!(purger.purge_once(), 1);
        assert!(kv.exists("weather:keep").unwrap());
    }

    #[tokio::test]
    async fn test_run_purges_on_each_tick_until_cancelled() {
        let kv = Arc::new(MemoryCache::new());
        let weather = weather_cache(kv.clone(), Duration::from_millis(10));
        weather.get_or_fetch(Coordinate::new(2.0, 2.0)).await;
        weather.get_or_fetch(Coordinate::new(3.0, 3.0)).await;

        let purger = Arc::new(ExpiredEntryPurger::new(weather, Duration::from_millis(30)));
        let cancel = CancellationToken::new();
        let handle = purger.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Both entries expired before the first tick and are gone without a read.
        assert_eq!(kv.purge_expired().unwrap(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
