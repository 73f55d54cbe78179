//! Optional maintenance task that re-fetches weather for every located
//! property on a fixed interval.
//!
//! Request-path lookups already refill expired entries; this only keeps the
//! cache warm so searches rarely pay for provider calls.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use propsearch_core::StoreError;
use propsearch_weather::{Coordinate, WeatherBatcher, WeatherRecordCache};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::snapshot::PropertySnapshotCache;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub coordinates: usize,
    pub refreshed: usize,
    pub failed: usize,
}

pub struct WeatherRefresher {
    snapshot: Arc<PropertySnapshotCache>,
    weather: Arc<WeatherRecordCache>,
    batcher: WeatherBatcher,
    interval: Duration,
}

impl WeatherRefresher {
    pub fn new(
        snapshot: Arc<PropertySnapshotCache>,
        weather: Arc<WeatherRecordCache>,
        batcher: WeatherBatcher,
        interval: Duration,
    ) -> Self {
        Self {
            snapshot,
            weather,
            batcher,
            interval,
        }
    }

    /// Re-fetch every distinct snapshot coordinate and rewrite the cache.
    ///
    /// Failed lookups leave the existing entry alone.
    pub async fn refresh_once(&self) -> Result<RefreshReport, StoreError> {
        let snapshot = self.snapshot.get().await?;

        let mut seen = HashSet::new();
        let coordinates: Vec<Coordinate> = snapshot
            .records
            .iter()
            .filter_map(|p| p.coordinate())
            .map(Coordinate::rounded)
            .filter(|c| seen.insert(c.cache_key()))
            .collect();

        let fetcher = self.weather.fetcher();
        let results = self
            .batcher
            .run(&coordinates, |coordinate: &Coordinate| fetcher.fetch(*coordinate))
            .await;

        let mut report = RefreshReport {
            coordinates: coordinates.len(),
            ..RefreshReport::default()
        };
        for (coordinate, result) in coordinates.iter().zip(results) {
            match result {
                Ok(record) => match self.weather.put(*coordinate, &record, self.weather.ttl()) {
                    Ok(()) => report.refreshed += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!("Weather refresh could not write cache: {}", e);
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    tracing::debug!(key = %coordinate.cache_key(), "Weather refresh lookup failed: {}", e);
                }
            }
        }

        tracing::info!(
            coordinates = report.coordinates,
            refreshed = report.refreshed,
            failed = report.failed,
            "Weather refresh complete"
        );
        Ok(report)
    }

    /// Refresh on every interval tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup isn't
        // hit with a full refresh.
        ticker.tick().await;

        tracing::info!("Weather refresher started (every {:?})", self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Weather refresher stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_once().await {
                        tracing::error!("Weather refresh skipped: {}", e);
                    }
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use propsearch_core::MemoryCache;
    use propsearch_weather::{CurrentConditions, WeatherError, WeatherFetcher, WeatherOrigin, WeatherSource};

    use super::*;
    use crate::property::PropertyRecord;
    use crate::snapshot::DEFAULT_SNAPSHOT_TTL;
    use crate::store::{PropertyStore, StoreResult};

    struct TwoCities;

    impl PropertyStore for TwoCities {
        fn find_active_properties(&self) -> StoreResult<Vec<PropertyRecord>> {
            let at = |id: i64, lat: Option<f64>| PropertyRecord {
                id,
                name: format!("Unit {}", id),
                city: String::new(),
                state: String::new(),
                country: String::new(),
                latitude: lat,
                longitude: lat.map(|_| 10.0),
                is_active: true,
                tags: Default::default(),
                created_at: Utc::now(),
            };
            // Units 1 and 2 share a rounded coordinate.
            Ok(vec![at(1, Some(45.0)), at(2, Some(45.000_01)), at(3, Some(46.0)), at(4, None)])
        }

        fn ping(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherSource for Counting {
        async fn fetch_current(&self, _coordinate: Coordinate) -> Result<CurrentConditions, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CurrentConditions {
                temperature: 5.0,
                humidity: 90.0,
                weather_code: 71,
            })
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn refresher(source: Arc<Counting>) -> (Arc<WeatherRefresher>, Arc<WeatherRecordCache>) {
        let snapshot = Arc::new(PropertySnapshotCache::new(Arc::new(TwoCities), DEFAULT_SNAPSHOT_TTL));
        let weather = Arc::new(WeatherRecordCache::new(
            Arc::new(MemoryCache::new()),
            Arc::new(WeatherFetcher::new(source)),
            Duration::from_secs(60),
        ));
        let refresher = WeatherRefresher::new(
            snapshot,
            weather.clone(),
            WeatherBatcher::new(10, Duration::ZERO),
            Duration::from_millis(20),
        );
        (Arc::new(refresher), weather)
    }

    #[tokio::test]
    async fn test_refresh_once_fetches_each_distinct_coordinate() {
        let source = Arc::new(Counting::default());
        let (refresher, weather) = refresher(source.clone());

        let report = refresher.refresh_once().await.unwrap();

        assert_eq!(report, RefreshReport { coordinates: 2, refreshed: 2, failed: 0 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(weather.len().unwrap(), 2);
        let cached = weather.get(Coordinate::new(46.0, 10.0)).unwrap();
        assert_eq!(cached.origin, WeatherOrigin::Cached);
        assert_eq!(cached.humidity, 90);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let source = Arc::new(Counting::default());
        let (refresher, _) = refresher(source.clone());
        let cancel = CancellationToken::new();

        let handle = refresher.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(70)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls = source.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected at least one refresh, saw {} calls", calls);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }
}
