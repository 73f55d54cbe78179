//! Single-coordinate weather lookup with a fallback record on failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::provider::WeatherSource;
use crate::types::{Coordinate, WeatherError, WeatherRecord};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters for provider traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherStats {
    pub provider_calls: u64,
    pub provider_failures: u64,
}

pub struct WeatherFetcher {
    source: Arc<dyn WeatherSource>,
    timeout: Duration,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl WeatherFetcher {
    pub fn new(source: Arc<dyn WeatherSource>) -> Self {
        Self {
            source,
            timeout: DEFAULT_TIMEOUT,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Upper bound on one lookup, retries included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch current weather for a coordinate.
    ///
    /// The coordinate is rounded first, so the record's key matches the
    /// cache key of every nearby lookup.
    pub async fn fetch(&self, coordinate: Coordinate) -> Result<WeatherRecord, WeatherError> {
        let coordinate = coordinate.rounded();
        self.calls.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(self.timeout, self.source.fetch_current(coordinate)).await {
            Ok(result) => result,
            Err(_) => Err(WeatherError::Timeout(self.timeout)),
        };

        match result {
            Ok(current) => Ok(WeatherRecord::from_conditions(
                coordinate,
                current.temperature,
                current.humidity,
                current.weather_code,
            )),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Like `fetch`, but a provider failure yields the default record.
    pub async fn fetch_or_default(&self, coordinate: Coordinate) -> WeatherRecord {
        match self.fetch(coordinate).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    provider = self.source.name(),
                    latitude = coordinate.latitude,
                    longitude = coordinate.longitude,
                    "Weather lookup failed, using default: {}",
                    e
                );
                WeatherRecord::fallback(Some(coordinate))
            }
        }
    }

    pub fn stats(&self) -> FetcherStats {
        FetcherStats {
            provider_calls: self.calls.load(Ordering::Relaxed),
            provider_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
