use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Request counters shared by every search.
#[derive(Debug, Default)]
pub struct ServiceCounters {
    searches: AtomicU64,
    weather_filtered_searches: AtomicU64,
    suggestions: AtomicU64,
    validation_failures: AtomicU64,
    store_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub searches: u64,
    pub weather_filtered_searches: u64,
    pub suggestions: u64,
    pub validation_failures: u64,
    pub store_failures: u64,
}

impl ServiceCounters {
    pub fn record_search(&self, weather_filtered: bool) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        if weather_filtered {
            self.weather_filtered_searches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_suggestion(&self) {
        self.suggestions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SearchStats {
        SearchStats {
            searches: self.searches.load(Ordering::Relaxed),
            weather_filtered_searches: self.weather_filtered_searches.load(Ordering::Relaxed),
            suggestions: self.suggestions.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}
