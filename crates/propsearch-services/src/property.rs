use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use propsearch_weather::Coordinate;
use serde::{Deserialize, Serialize};

/// A property master record as held by the source-of-truth store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl PropertyRecord {
    /// Location, when both components are present and finite.
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                Some(Coordinate::new(lat, lng))
            }
            _ => None,
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.coordinate().is_some()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_coordinate_requires_both_components() {
        let mut p: PropertyRecord = serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "Harbor Loft",
            "latitude": 40.0
        }))
        .unwrap();
        assert!(p.coordinate().is_none());

        p.longitude = Some(-74.0);
        assert_eq!(p.coordinate(), Some(Coordinate::new(40.0, -74.0)));

        p.latitude = Some(f64::NAN);
        assert!(!p.has_coordinates());
    }

    #[test]
    fn test_seed_json_defaults() {
        let p: PropertyRecord = serde_json::from_value(serde_json::json!({
            "id": 7,
            "name": "Cabin",
            "city": "Aspen",
            "state": "CO",
            "tags": ["ski", "mountain", "ski"]
        }))
        .unwrap();
        assert!(p.is_active);
        assert_eq!(p.tags.len(), 2);
        assert_eq!(p.country, "");
    }
}
