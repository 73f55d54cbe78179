//! Property search pipeline: snapshot cache, filters, weather enrichment
//! and pagination.

pub mod error;
pub mod filters;
pub mod property;
pub mod purge;
pub mod refresh;
pub mod search;
pub mod snapshot;
pub mod stats;
pub mod store;

pub use error::SearchError;
pub use filters::{SearchFilters, SearchQuery};
pub use property::PropertyRecord;
pub use purge::ExpiredEntryPurger;
pub use refresh::{RefreshReport, WeatherRefresher};
pub use search::{PropertyWithWeather, SearchEngine, SearchMeta, SearchResult, Suggestion};
pub use snapshot::{PropertySnapshot, PropertySnapshotCache, SnapshotStats};
pub use stats::{SearchStats, ServiceCounters};
pub use store::{PropertyStore, SqlitePropertyStore};
