//! JSON bodies returned by the HTTP API.

use propsearch_services::{
    PropertyWithWeather, SearchFilters, SearchMeta, SearchResult, SearchStats, SnapshotStats,
    Suggestion,
};
use propsearch_weather::{FetcherStats, WeatherCacheStats};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<PropertyWithWeather>,
    pub pagination: Pagination,
    pub filters: SearchFilters,
    pub meta: SearchMeta,
}

impl SearchResponse {
    pub fn new(result: SearchResult, filters: SearchFilters) -> Self {
        Self {
            success: true,
            pagination: Pagination {
                total: result.total,
                limit: result.limit,
                offset: result.offset,
                has_more: result.has_more,
            },
            data: result.data,
            filters,
            meta: result.meta,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub success: bool,
    pub data: Vec<Suggestion>,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    pub fn up() -> Self {
        Self {
            status: "up",
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: "down",
            error: Some(error.into()),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == "up"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, `degraded` (cache down) or `unavailable` (store down)
    pub status: &'static str,
    pub store: ComponentHealth,
    pub cache: ComponentHealth,
    pub snapshot: SnapshotStats,
    pub uptime_secs: u64,
    pub version: &'static str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyCounts {
    pub total: usize,
    pub with_coordinates: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub properties: PropertyCounts,
    pub search: SearchStats,
    pub snapshot: SnapshotStats,
    pub weather_cache: WeatherCacheStats,
    /// Live entries in the key-value cache; absent when the backend is down
    pub weather_entries: Option<usize>,
    pub provider: FetcherStats,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_conditions: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            valid_conditions: None,
        }
    }
}
