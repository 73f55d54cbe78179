//! Search filters: parsing raw query parameters, validation and the
//! structural and weather predicates.

use propsearch_core::{SearchConfig, ValidationError};
use propsearch_weather::{WeatherCondition, WeatherRecord};
use serde::{Deserialize, Serialize};

use crate::property::PropertyRecord;

pub const TEMPERATURE_RANGE: (f64, f64) = (-20.0, 50.0);
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
pub const DEFAULT_LIMIT: usize = 20;

/// Query parameters exactly as the client sent them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search_text: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub temp_min: Option<String>,
    pub temp_max: Option<String>,
    pub humidity_min: Option<String>,
    pub humidity_max: Option<String>,
    pub weather_condition: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity_max: Option<f64>,
    #[serde(rename = "weatherCondition", skip_serializing_if = "Option::is_none")]
    pub condition: Option<WeatherCondition>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            search_text: None,
            city: None,
            state: None,
            temp_min: None,
            temp_max: None,
            humidity_min: None,
            humidity_max: None,
            condition: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl SearchFilters {
    /// Parse and validate raw query parameters.
    ///
    /// Blank values are treated as absent.
    pub fn from_query(query: &SearchQuery, config: &SearchConfig) -> Result<Self, ValidationError> {
        let condition = match present(&query.weather_condition) {
            Some(raw) => Some(raw.parse::<WeatherCondition>().map_err(|_| {
                ValidationError::new(
                    "weatherCondition",
                    format!(
                        "weatherCondition must be one of: {}",
                        WeatherCondition::names().join(", ")
                    ),
                )
                .with_valid_values(WeatherCondition::names())
            })?),
            None => None,
        };

        let filters = Self {
            search_text: present(&query.search_text).map(str::to_string),
            city: present(&query.city).map(str::to_string),
            state: present(&query.state).map(str::to_string),
            temp_min: parse_number("tempMin", &query.temp_min)?,
            temp_max: parse_number("tempMax", &query.temp_max)?,
            humidity_min: parse_number("humidityMin", &query.humidity_min)?,
            humidity_max: parse_number("humidityMax", &query.humidity_max)?,
            condition,
            limit: parse_count("limit", &query.limit)?.unwrap_or(config.default_limit),
            offset: parse_count("offset", &query.offset)?.unwrap_or(0),
        };

        filters.validate(config.max_limit)?;
        Ok(filters)
    }

    /// Range and consistency checks.
    pub fn validate(&self, max_limit: usize) -> Result<(), ValidationError> {
        check_range("tempMin", self.temp_min, TEMPERATURE_RANGE)?;
        check_range("tempMax", self.temp_max, TEMPERATURE_RANGE)?;
        check_range("humidityMin", self.humidity_min, HUMIDITY_RANGE)?;
        check_range("humidityMax", self.humidity_max, HUMIDITY_RANGE)?;

        if let (Some(min), Some(max)) = (self.temp_min, self.temp_max) {
            if min > max {
                return Err(ValidationError::new(
                    "tempMin",
                    "tempMin must not be greater than tempMax",
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.humidity_min, self.humidity_max) {
            if min > max {
                return Err(ValidationError::new(
                    "humidityMin",
                    "humidityMin must not be greater than humidityMax",
                ));
            }
        }

        if self.limit == 0 || self.limit > max_limit {
            return Err(ValidationError::out_of_range("limit", 1, max_limit));
        }
        Ok(())
    }

    pub fn has_weather_filters(&self) -> bool {
        self.temp_min.is_some()
            || self.temp_max.is_some()
            || self.humidity_min.is_some()
            || self.humidity_max.is_some()
            || self.condition.is_some()
    }

    /// Case-insensitive substring match on name, city and state.
    pub fn matches_structure(&self, property: &PropertyRecord) -> bool {
        contains_ci(&property.name, self.search_text.as_deref())
            && contains_ci(&property.city, self.city.as_deref())
            && contains_ci(&property.state, self.state.as_deref())
    }

    /// Inclusive range checks plus exact condition match.
    pub fn matches_weather(&self, weather: &WeatherRecord) -> bool {
        let temperature = f64::from(weather.temperature);
        let humidity = f64::from(weather.humidity);

        self.temp_min.map_or(true, |min| temperature >= min)
            && self.temp_max.map_or(true, |max| temperature <= max)
            && self.humidity_min.map_or(true, |min| humidity >= min)
            && self.humidity_max.map_or(true, |max| humidity <= max)
            && self.condition.map_or(true, |c| weather.condition == c)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number(field: &str, raw: &Option<String>) -> Result<Option<f64>, ValidationError> {
    let Some(raw) = present(raw) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(ValidationError::new(field, format!("{} must be a number", field))),
    }
}

fn parse_count(field: &str, raw: &Option<String>) -> Result<Option<usize>, ValidationError> {
    let Some(raw) = present(raw) else {
        return Ok(None);
    };
    raw.parse::<usize>().map(Some).map_err(|_| {
        ValidationError::new(field, format!("{} must be a non-negative integer", field))
    })
}

fn check_range(field: &str, value: Option<f64>, (min, max): (f64, f64)) -> Result<(), ValidationError> {
    match value {
        Some(v) if v < min || v > max => Err(ValidationError::out_of_range(field, min, max)),
        _ => Ok(()),
    }
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}
