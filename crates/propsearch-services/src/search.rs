//! Search orchestration.
//!
//! Structural filters run over the snapshot first. Without weather filters
//! the structural matches are paginated and only the page is enriched.
//! With weather filters every located structural match is enriched, the
//! weather predicates are applied to the whole set, and only then is the
//! result paginated, so `total` and `hasMore` count every active filter.

use std::sync::Arc;
use std::time::Instant;

use propsearch_core::SearchConfig;
use propsearch_weather::{Coordinate, WeatherBatcher, WeatherOrigin, WeatherRecord, WeatherRecordCache};
use serde::Serialize;

use crate::error::SearchError;
use crate::filters::SearchFilters;
use crate::property::PropertyRecord;
use crate::snapshot::PropertySnapshotCache;
use crate::stats::{SearchStats, ServiceCounters};

pub const MAX_SUGGESTIONS: usize = 10;
pub const MIN_SUGGESTION_QUERY: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyWithWeather {
    #[serde(flatten)]
    pub property: PropertyRecord,
    pub weather: WeatherRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMeta {
    pub search_time_ms: u64,
    pub snapshot_version: u64,
    pub snapshot_age_secs: u64,
    pub snapshot_reloaded: bool,
    /// Weather was resolved for the full structural set, not just the page.
    pub weather_filtered: bool,
    /// Distinct coordinates resolved during this search.
    pub weather_lookups: usize,
    pub weather_cache_hits: usize,
    pub weather_fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub data: Vec<PropertyWithWeather>,
    /// Records satisfying every active filter.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
    pub meta: SearchMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub id: i64,
    pub label: String,
    pub value: String,
    pub city: String,
    pub state: String,
}

impl From<&PropertyRecord> for Suggestion {
    fn from(property: &PropertyRecord) -> Self {
        let label = match (property.city.is_empty(), property.state.is_empty()) {
            (false, false) => format!("{} - {}, {}", property.name, property.city, property.state),
            (false, true) => format!("{} - {}", property.name, property.city),
            _ => property.name.clone(),
        };
        Self {
            id: property.id,
            label,
            value: property.name.clone(),
            city: property.city.clone(),
            state: property.state.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Enrichment {
    weather: Vec<WeatherRecord>,
    lookups: usize,
    cache_hits: usize,
    fallbacks: usize,
}

pub struct SearchEngine {
    snapshot: Arc<PropertySnapshotCache>,
    weather: Arc<WeatherRecordCache>,
    batcher: WeatherBatcher,
    config: SearchConfig,
    counters: ServiceCounters,
}

impl SearchEngine {
    pub fn new(
        snapshot: Arc<PropertySnapshotCache>,
        weather: Arc<WeatherRecordCache>,
        batcher: WeatherBatcher,
        config: SearchConfig,
    ) -> Self {
        Self {
            snapshot,
            weather,
            batcher,
            config,
            counters: ServiceCounters::default(),
        }
    }

    pub fn snapshot(&self) -> &Arc<PropertySnapshotCache> {
        &self.snapshot
    }

    pub fn weather(&self) -> &Arc<WeatherRecordCache> {
        &self.weather
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn stats(&self) -> SearchStats {
        self.counters.snapshot()
    }

    /// Count a rejected request that never reached `search`.
    pub fn note_validation_failure(&self) {
        self.counters.record_validation_failure();
    }

    /// Run one search.
    ///
    /// # Errors
    /// `Validation` before any cache or store access; `StoreUnavailable`
    /// when the snapshot needs a reload and the store is down. Weather and
    /// cache failures degrade to default weather instead.
    #[tracing::instrument(skip_all, fields(limit = filters.limit, offset = filters.offset))]
    pub async fn search(&self, filters: &SearchFilters) -> Result<SearchResult, SearchError> {
        let started = Instant::now();

        if let Err(e) = filters.validate(self.config.max_limit) {
            self.counters.record_validation_failure();
            return Err(e.into());
        }

        let snapshot = self.snapshot.get().await.map_err(|e| {
            self.counters.record_store_failure();
            SearchError::from(e)
        })?;

        let structural: Vec<&PropertyRecord> = snapshot
            .records
            .iter()
            .filter(|p| filters.matches_structure(p))
            .collect();

        let weather_filtered = filters.has_weather_filters();
        let (data, total, enrichment) = if weather_filtered {
            self.filter_then_paginate(&structural, filters).await
        } else {
            self.paginate_then_enrich(&structural, filters).await
        };

        let has_more = filters.offset + data.len() < total;
        let meta = SearchMeta {
            search_time_ms: started.elapsed().as_millis() as u64,
            snapshot_version: snapshot.version,
            snapshot_age_secs: snapshot.age.as_secs(),
            snapshot_reloaded: snapshot.reloaded,
            weather_filtered,
            weather_lookups: enrichment.lookups,
            weather_cache_hits: enrichment.cache_hits,
            weather_fallbacks: enrichment.fallbacks,
        };

        self.counters.record_search(weather_filtered);
        tracing::info!(
            total,
            returned = data.len(),
            weather_filtered,
            elapsed_ms = meta.search_time_ms,
            "Search complete"
        );

        Ok(SearchResult {
            data,
            total,
            limit: filters.limit,
            offset: filters.offset,
            has_more,
            meta,
        })
    }

    /// Up to ten properties whose name contains `q`, served from the snapshot.
    pub async fn suggestions(&self, q: &str) -> Result<Vec<Suggestion>, SearchError> {
        let needle = q.trim().to_lowercase();
        if needle.chars().count() < MIN_SUGGESTION_QUERY {
            return Ok(Vec::new());
        }

        let snapshot = self.snapshot.get().await.map_err(|e| {
            self.counters.record_store_failure();
            SearchError::from(e)
        })?;
        self.counters.record_suggestion();

        Ok(snapshot
            .records
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .take(MAX_SUGGESTIONS)
            .map(Suggestion::from)
            .collect())
    }

    async fn paginate_then_enrich(
        &self,
        structural: &[&PropertyRecord],
        filters: &SearchFilters,
    ) -> (Vec<PropertyWithWeather>, usize, Enrichment) {
        let total = structural.len();
        let start = filters.offset.min(total);
        let end = filters.offset.saturating_add(filters.limit).min(total);
        let page = &structural[start..end];

        let mut enrichment = self.enrich(page).await;
        let weather = std::mem::take(&mut enrichment.weather);
        let data = page
            .iter()
            .zip(weather)
            .map(|(property, weather)| PropertyWithWeather {
                property: (*property).clone(),
                weather,
            })
            .collect();

        (data, total, enrichment)
    }

    async fn filter_then_paginate(
        &self,
        structural: &[&PropertyRecord],
        filters: &SearchFilters,
    ) -> (Vec<PropertyWithWeather>, usize, Enrichment) {
        // Without a location no weather filter can be satisfied.
        let located: Vec<&PropertyRecord> = structural
            .iter()
            .copied()
            .filter(|p| p.has_coordinates())
            .collect();

        let mut enrichment = self.enrich(&located).await;
        let weather = std::mem::take(&mut enrichment.weather);
        let matched: Vec<(&PropertyRecord, WeatherRecord)> = located
            .into_iter()
            .zip(weather)
            .filter(|(_, weather)| filters.matches_weather(weather))
            .collect();

        let total = matched.len();
        let data = matched
            .into_iter()
            .skip(filters.offset)
            .take(filters.limit)
            .map(|(property, weather)| PropertyWithWeather {
                property: property.clone(),
                weather,
            })
            .collect();

        (data, total, enrichment)
    }

    /// One weather record per property, positionally.
    ///
    /// Properties without coordinates get the default record.
    async fn enrich(&self, properties: &[&PropertyRecord]) -> Enrichment {
        let coordinates: Vec<Coordinate> = properties.iter().filter_map(|p| p.coordinate()).collect();
        let mut resolved = self
            .weather
            .get_or_fetch_many(&self.batcher, &coordinates)
            .await
            .into_iter();

        let mut keys = std::collections::HashSet::new();
        let mut enrichment = Enrichment {
            lookups: coordinates.iter().filter(|c| keys.insert(c.cache_key())).count(),
            ..Enrichment::default()
        };

        for property in properties {
            let weather = match property.coordinate() {
                Some(coordinate) => resolved
                    .next()
                    .unwrap_or_else(|| WeatherRecord::fallback(Some(coordinate))),
                None => WeatherRecord::fallback(None),
            };
            match weather.origin {
                WeatherOrigin::Cached => enrichment.cache_hits += 1,
                WeatherOrigin::Fallback => enrichment.fallbacks += 1,
                WeatherOrigin::Live => {}
            }
            enrichment.weather.push(weather);
        }

        enrichment
    }
}
