use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decimal digits kept when rounding coordinates for cache keys.
pub const COORDINATE_PRECISION: i32 = 4;

/// Key prefix for weather entries in the key-value cache.
pub const CACHE_KEY_PREFIX: &str = "weather:";

pub const DEFAULT_TEMPERATURE: i32 = 25;
pub const DEFAULT_HUMIDITY: i32 = 60;

/// Geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Round both components to `COORDINATE_PRECISION` digits so nearby
    /// lookups share a cache entry.
    pub fn rounded(self) -> Self {
        Self {
            latitude: round_component(self.latitude),
            longitude: round_component(self.longitude),
        }
    }

    /// Cache key of the rounded coordinate, e.g. `weather:40.7128,-74.0060`.
    pub fn cache_key(self) -> String {
        let r = self.rounded();
        format!("{}{:.4},{:.4}", CACHE_KEY_PREFIX, r.latitude, r.longitude)
    }
}

fn round_component(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_PRECISION);
    // Adding 0.0 turns -0.0 into 0.0 so both spell the same key.
    (value * factor).round() / factor + 0.0
}

/// Weather condition categories mapped from WMO codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WeatherCondition {
    #[default]
    Clear,
    Cloudy,
    Drizzle,
    Rainy,
    Snow,
}

impl WeatherCondition {
    pub const ALL: [WeatherCondition; 5] = [
        Self::Clear,
        Self::Cloudy,
        Self::Drizzle,
        Self::Rainy,
        Self::Snow,
    ];

    /// Convert WMO weather code to WeatherCondition
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1..=3 => Self::Cloudy,
            51..=57 => Self::Drizzle,
            61..=67 | 80..=82 => Self::Rainy,
            71..=77 | 85..=86 => Self::Snow,
            _ => Self::Clear, // Unknown codes are treated as benign
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Cloudy => "Cloudy",
            Self::Drizzle => "Drizzle",
            Self::Rainy => "Rainy",
            Self::Snow => "Snow",
        }
    }

    /// Names of every condition, in declaration order.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }
}

impl std::fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a condition name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown weather condition: {0}")]
pub struct UnknownCondition(pub String);

impl std::str::FromStr for WeatherCondition {
    type Err = UnknownCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCondition(s.to_string()))
    }
}

/// Where a weather record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeatherOrigin {
    /// Fetched from the provider during this request
    #[default]
    Live,
    /// Served from the weather cache
    Cached,
    /// Provider unavailable or property has no coordinates
    Fallback,
}

/// Current weather at a coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRecord {
    /// Rounded coordinate; `None` only for fallback records of properties
    /// without a location.
    #[serde(flatten)]
    pub coordinate: Option<Coordinate>,
    /// Degrees Celsius
    pub temperature: i32,
    /// Relative humidity, percent
    pub humidity: i32,
    pub weather_code: i32,
    pub condition: WeatherCondition,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub origin: WeatherOrigin,
}

impl WeatherRecord {
    /// Build a record from raw provider values.
    pub fn from_conditions(
        coordinate: Coordinate,
        temperature: f64,
        humidity: f64,
        weather_code: i32,
    ) -> Self {
        Self {
            coordinate: Some(coordinate.rounded()),
            temperature: temperature.round() as i32,
            humidity: humidity.round() as i32,
            weather_code,
            condition: WeatherCondition::from_wmo_code(weather_code),
            last_updated: Utc::now(),
            origin: WeatherOrigin::Live,
        }
    }

    /// Default record used when real weather is unavailable.
    pub fn fallback(coordinate: Option<Coordinate>) -> Self {
        Self {
            coordinate: coordinate.map(Coordinate::rounded),
            temperature: DEFAULT_TEMPERATURE,
            humidity: DEFAULT_HUMIDITY,
            weather_code: 0,
            condition: WeatherCondition::Clear,
            last_updated: Utc::now(),
            origin: WeatherOrigin::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == WeatherOrigin::Fallback
    }
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Provider returned status {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}
