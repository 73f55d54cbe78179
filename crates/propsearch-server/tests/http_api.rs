//! HTTP contract tests driven through `warp::test`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use propsearch_core::{Config, Environment, MemoryCache, StoreError};
use propsearch_server::{routes, AppState};
use propsearch_services::store::StoreResult;
use propsearch_services::{PropertyRecord, PropertyStore, SqlitePropertyStore};
use propsearch_weather::{Coordinate, CurrentConditions, WeatherError, WeatherSource};
use serde_json::Value;

/// 31 °C and drizzle north of latitude 45, 18 °C and clear elsewhere.
struct SplitWeather;

#[async_trait]
impl WeatherSource for SplitWeather {
    async fn fetch_current(&self, coordinate: Coordinate) -> Result<CurrentConditions, WeatherError> {
        Ok(if coordinate.latitude > 45.0 {
            CurrentConditions {
                temperature: 31.0,
                humidity: 80.0,
                weather_code: 53,
            }
        } else {
            CurrentConditions {
                temperature: 18.0,
                humidity: 35.0,
                weather_code: 0,
            }
        })
    }

    fn name(&self) -> &'static str {
        "split"
    }
}

fn record(id: i64, name: &str, city: &str, latitude: Option<f64>) -> PropertyRecord {
    PropertyRecord {
        id,
        name: name.into(),
        city: city.into(),
        state: "WA".into(),
        country: "US".into(),
        latitude,
        longitude: latitude.map(|_| -120.0),
        is_active: true,
        tags: Default::default(),
        created_at: Utc::now(),
    }
}

fn fixtures() -> Vec<PropertyRecord> {
    vec![
        record(1, "Cascade Cabin", "Leavenworth", Some(47.6)),
        record(2, "Desert Rose", "Yakima", Some(44.0)),
        record(3, "Harbor View", "Seattle", Some(47.61)),
        record(4, "Lost Meadow", "Unknown", None),
    ]
}

fn state_with(store: Arc<dyn PropertyStore>, environment: Environment) -> Arc<AppState> {
    let mut config = Config::default();
    config.server.environment = environment;
    config.weather.batch_delay_ms = 0;
    Arc::new(AppState::from_parts(
        &config,
        store,
        Arc::new(MemoryCache::new()),
        Arc::new(SplitWeather),
    ))
}

fn state() -> Arc<AppState> {
    let store = SqlitePropertyStore::in_memory().unwrap();
    store.upsert_many(&fixtures()).unwrap();
    state_with(Arc::new(store), Environment::Development)
}

async fn get(state: &Arc<AppState>, path: &str) -> (u16, Value) {
    let res = warp::test::request()
        .method("GET")
        .path(path)
        .reply(&routes(state.clone()))
        .await;
    (res.status().as_u16(), serde_json::from_slice(res.body()).unwrap())
}

#[tokio::test]
async fn test_get_properties_envelope() {
    let state = state();

    let (status, body) = get(&state, "/get-properties?limit=2").await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 4);
    assert_eq!(body["pagination"]["limit"], 2);
    assert_eq!(body["pagination"]["offset"], 0);
    assert_eq!(body["pagination"]["hasMore"], true);
    assert_eq!(body["filters"]["limit"], 2);

    let first = &body["data"][0];
    assert_eq!(first["name"], "Cascade Cabin");
    assert_eq!(first["weather"]["temperature"], 31);
    assert_eq!(first["weather"]["condition"], "Drizzle");
}

#[tokio::test]
async fn test_weather_filter_excludes_unlocated_properties() {
    let state = state();

    let (status, body) = get(&state, "/get-properties?tempMin=30&weatherCondition=drizzle").await;

    assert_eq!(status, 200);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["hasMore"], false);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Cascade Cabin", "Harbor View"]);
    assert_eq!(body["filters"]["weatherCondition"], "Drizzle");
}

#[tokio::test]
async fn test_out_of_range_temperature_is_400() {
    let (status, body) = get(&state(), "/get-properties?tempMin=-25").await;

    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("-20") && message.contains("50"), "{}", message);
}

#[tokio::test]
async fn test_out_of_range_humidity_is_400() {
    let (status, body) = get(&state(), "/get-properties?humidityMax=150").await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "humidityMax must be between 0 and 100");
}

#[tokio::test]
async fn test_unknown_condition_lists_valid_conditions() {
    let state = state();
    let (status, body) = get(&state, "/get-properties?weatherCondition=Foggy").await;

    assert_eq!(status, 400);
    assert_eq!(
        body["validConditions"],
        serde_json::json!(["Clear", "Cloudy", "Drizzle", "Rainy", "Snow"])
    );

    let (_, metrics) = get(&state, "/metrics").await;
    assert_eq!(metrics["search"]["validationFailures"], 1);
}

#[tokio::test]
async fn test_suggestions() {
    let state = state();

    let (_, short) = get(&state, "/suggestions?q=c").await;
    assert_eq!(short["data"], serde_json::json!([]));

    let (status, body) = get(&state, "/suggestions?q=harb").await;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"],
        serde_json::json!([{
            "id": 3,
            "label": "Harbor View - Seattle, WA",
            "value": "Harbor View",
            "city": "Seattle",
            "state": "WA"
        }])
    );
}

#[tokio::test]
async fn test_admin_sync_and_clear_cache() {
    let state = state();
    get(&state, "/get-properties").await;

    let res = warp::test::request()
        .method("POST")
        .path("/admin/sync-redis")
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), 200);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["count"], 4);

    let res = warp::test::request()
        .method("DELETE")
        .path("/admin/clear-cache")
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), 200);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    // Three located properties, three distinct coordinates.
    assert_eq!(body["count"], 3);
    assert!(state.engine.snapshot().peek().is_none());
}

#[tokio::test]
async fn test_health_and_metrics() {
    let state = state();
    get(&state, "/get-properties").await;

    let (status, health) = get(&state, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["store"]["status"], "up");

    let (status, metrics) = get(&state, "/metrics").await;
    assert_eq!(status, 200);
    assert_eq!(metrics["properties"]["total"], 4);
    assert_eq!(metrics["properties"]["withCoordinates"], 3);
    assert_eq!(metrics["search"]["searches"], 1);
    assert_eq!(metrics["weatherEntries"], 3);
    assert_eq!(metrics["provider"]["providerCalls"], 3);
}

struct FlakyStore {
    down: AtomicBool,
}

impl PropertyStore for FlakyStore {
    fn find_active_properties(&self) -> StoreResult<Vec<PropertyRecord>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("could not connect to /var/lib/props.db".into()));
        }
        Ok(fixtures())
    }

    fn ping(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("could not connect to /var/lib/props.db".into()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_store_outage_in_production_hides_details() {
    let store = Arc::new(FlakyStore {
        down: AtomicBool::new(true),
    });
    let state = state_with(store.clone(), Environment::Production);

    let (status, body) = get(&state, "/get-properties").await;
    assert_eq!(status, 500);
    assert!(!body["error"].as_str().unwrap().contains("/var/lib"));

    let (status, health) = get(&state, "/health").await;
    assert_eq!(status, 503);
    assert_eq!(health["status"], "unavailable");

    store.down.store(false, Ordering::SeqCst);
    let (status, _) = get(&state, "/get-properties").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_store_outage_in_development_shows_details() {
    let state = state_with(
        Arc::new(FlakyStore {
            down: AtomicBool::new(true),
        }),
        Environment::Development,
    );

    let (status, body) = get(&state, "/get-properties").await;
    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("/var/lib/props.db"));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let (status, body) = get(&state(), "/nope").await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let res = warp::test::request()
        .method("GET")
        .path("/admin/clear-cache")
        .reply(&routes(state()))
        .await;
    assert_eq!(res.status(), 405);
}

#[tokio::test]
async fn test_background_tasks_stop_on_shutdown() {
    let state = state();
    state.start_background();

    tokio::time::timeout(Duration::from_secs(1), state.shutdown())
        .await
        .expect("background tasks did not stop");
}
