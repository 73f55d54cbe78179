//! Integration tests for OpenMeteoProvider using wiremock.
//!
//! These tests verify request shape, response parsing, retries and the
//! fallback behavior of WeatherFetcher against a mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use propsearch_weather::retry::RetryConfig;
use propsearch_weather::{
    Coordinate, OpenMeteoProvider, WeatherCondition, WeatherError, WeatherFetcher, WeatherSource,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn current_body(temperature: f64, humidity: f64, code: i32) -> serde_json::Value {
    serde_json::json!({
        "latitude": 40.71,
        "longitude": -74.01,
        "current": {
            "time": "2026-01-30T12:00",
            "temperature_2m": temperature,
            "relative_humidity_2m": humidity,
            "weather_code": code
        }
    })
}

fn provider(server: &MockServer, retry: RetryConfig) -> OpenMeteoProvider {
    OpenMeteoProvider::new(&server.uri(), Duration::from_secs(2), retry).unwrap()
}

#[tokio::test]
async fn test_fetch_current_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "40.7128"))
        .and(query_param("longitude", "-74.006"))
        .and(query_param("current", "temperature_2m,relative_humidity_2m,weather_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body(21.7, 64.2, 63)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider(&mock_server, RetryConfig::disabled());
    let current = provider
        .fetch_current(Coordinate::new(40.7128, -74.006))
        .await
        .unwrap();

    assert_eq!(current.weather_code, 63);
    assert!((current.temperature - 21.7).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_fetcher_builds_rounded_record() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body(29.5, 64.4, 81)))
        .mount(&mock_server)
        .await;

    let fetcher = WeatherFetcher::new(Arc::new(provider(&mock_server, RetryConfig::disabled())));
    let record = fetcher
        .fetch(Coordinate::new(40.712_81, -74.006_01))
        .await
        .unwrap();

    assert_eq!(record.temperature, 30);
    assert_eq!(record.humidity, 64);
    assert_eq!(record.condition, WeatherCondition::Rainy);
    assert_eq!(record.coordinate, Some(Coordinate::new(40.7128, -74.006)));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body(10.0, 50.0, 0)))
        .mount(&mock_server)
        .await;

    let provider = provider(&mock_server, RetryConfig::new(2, 10, 50));
    let current = provider.fetch_current(Coordinate::new(1.0, 1.0)).await.unwrap();

    assert_eq!(current.weather_code, 0);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": true,
            "reason": "Latitude must be in range of -90 to 90°."
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider(&mock_server, RetryConfig::new(3, 10, 50));
    let result = provider.fetch_current(Coordinate::new(1.0, 1.0)).await;

    assert!(matches!(result, Err(WeatherError::Status(400))));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "current": { "temperature_2m": 12.0 }
        })))
        .mount(&mock_server)
        .await;

    let provider = provider(&mock_server, RetryConfig::disabled());
    let result = provider.fetch_current(Coordinate::new(1.0, 1.0)).await;

    assert!(matches!(result, Err(WeatherError::Parse(_))));
}

#[tokio::test]
async fn test_slow_provider_degrades_to_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(current_body(40.0, 10.0, 0))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let provider =
        OpenMeteoProvider::new(&mock_server.uri(), Duration::from_millis(100), RetryConfig::disabled())
            .unwrap();
    let fetcher = WeatherFetcher::new(Arc::new(provider));

    let record = fetcher.fetch_or_default(Coordinate::new(1.0, 1.0)).await;

    assert!(record.is_fallback());
    assert_eq!(record.temperature, 25);
    assert_eq!(record.humidity, 60);
    assert_eq!(fetcher.stats().provider_failures, 1);
}
