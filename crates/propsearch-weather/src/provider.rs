//! Current-conditions lookup against an Open-Meteo compatible API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::retry::{with_retry, RetryConfig};
use crate::types::{Coordinate, WeatherError};

const USER_AGENT: &str = "propsearch/0.1.0";
const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,weather_code";

/// Raw values reported by a provider for one coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub humidity: f64,
    pub weather_code: i32,
}

/// External weather provider.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_current(&self, coordinate: Coordinate) -> Result<CurrentConditions, WeatherError>;

    /// Provider name for logs and diagnostics.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    weather_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    client: Arc<Client>,
    base_url: String,
    retry: RetryConfig,
}

impl OpenMeteoProvider {
    /// `timeout` bounds each individual HTTP attempt.
    pub fn new(base_url: &str, timeout: Duration, retry: RetryConfig) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoProvider {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_current(&self, coordinate: Coordinate) -> Result<CurrentConditions, WeatherError> {
        let url = format!("{}/v1/forecast", self.base_url);
        let latitude = coordinate.latitude.to_string();
        let longitude = coordinate.longitude.to_string();

        let response = with_retry(&self.retry, || {
            self.client
                .get(&url)
                .query(&[
                    ("latitude", latitude.as_str()),
                    ("longitude", longitude.as_str()),
                    ("current", CURRENT_FIELDS),
                ])
                .send()
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status.as_u16()));
        }

        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Parse(e.to_string()))?;

        let current = body
            .current
            .ok_or_else(|| WeatherError::Parse("response has no current block".to_string()))?;

        match (
            current.temperature_2m,
            current.relative_humidity_2m,
            current.weather_code,
        ) {
            (Some(temperature), Some(humidity), Some(weather_code)) => Ok(CurrentConditions {
                temperature,
                humidity,
                weather_code,
            }),
            _ => Err(WeatherError::Parse(
                "current block is missing temperature, humidity or weather code".to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "open-meteo"
    }
}
