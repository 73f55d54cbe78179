//! Weather enrichment for property search
//!
//! Fetches current conditions from an Open-Meteo compatible API, batches
//! lookups under a concurrency ceiling, and caches records per rounded
//! coordinate.

pub mod batcher;
pub mod cache;
pub mod fetcher;
pub mod provider;
pub mod retry;
pub mod types;

pub use batcher::{TaggedCoordinate, TaggedWeather, WeatherBatcher};
pub use cache::{WeatherCacheStats, WeatherRecordCache};
pub use fetcher::{FetcherStats, WeatherFetcher};
pub use provider::{CurrentConditions, OpenMeteoProvider, WeatherSource};
pub use types::*;
