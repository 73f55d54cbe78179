//! Bounded-concurrency weather lookups.
//!
//! Input is split into fixed-size groups. Each group's lookups run
//! concurrently; groups run one after another with a pacing delay between
//! them so the provider never sees more than `batch_size` calls in flight
//! from one request.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::fetcher::WeatherFetcher;
use crate::types::{Coordinate, WeatherRecord};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// A coordinate together with the property it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedCoordinate {
    pub property_id: i64,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedWeather {
    pub property_id: i64,
    pub weather: WeatherRecord,
}

#[derive(Debug, Clone)]
pub struct WeatherBatcher {
    batch_size: usize,
    delay: Duration,
}

impl Default for WeatherBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_DELAY)
    }
}

impl WeatherBatcher {
    /// A zero `batch_size` is treated as 1.
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `op` over every item in paced groups.
    ///
    /// `output[i]` is the result for `items[i]` regardless of completion order.
    pub async fn run<T, F, Fut>(&self, items: &[T], op: F) -> Vec<Fut::Output>
    where
        F: Fn(&T) -> Fut,
        Fut: Future,
    {
        let mut results = Vec::with_capacity(items.len());
        let groups = items.len().div_ceil(self.batch_size);

        for (index, group) in items.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            tracing::debug!(
                "Weather batch {}/{} ({} lookups)",
                index + 1,
                groups,
                group.len()
            );
            results.extend(join_all(group.iter().map(&op)).await);
        }

        results
    }

    /// Fetch weather for each tagged coordinate, one record per input.
    ///
    /// Provider failures degrade to the default record for that entry only.
    pub async fn fetch_batch(
        &self,
        fetcher: &WeatherFetcher,
        items: &[TaggedCoordinate],
    ) -> Vec<TaggedWeather> {
        self.run(items, |item: &TaggedCoordinate| {
            let item = *item;
            async move {
                TaggedWeather {
                    property_id: item.property_id,
                    weather: fetcher.fetch_or_default(item.coordinate).await,
                }
            }
        })
        .await
    }
}
