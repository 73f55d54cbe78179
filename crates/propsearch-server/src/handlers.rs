//! Request handlers. Each translates query parameters into a service call
//! and the outcome into a JSON reply.

use std::convert::Infallible;
use std::sync::Arc;

use propsearch_core::{AppError, StoreError};
use propsearch_services::{SearchError, SearchFilters, SearchQuery};
use serde::Deserialize;
use warp::http::StatusCode;
use warp::reply::{json, with_status, Response};
use warp::{Rejection, Reply};

use crate::error_mapping::error_reply;
use crate::responses::{
    AdminResponse, ComponentHealth, ErrorResponse, HealthResponse, MetricsResponse, PropertyCounts,
    SearchResponse, SuggestionsResponse,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionQuery {
    pub q: Option<String>,
}

/// GET /get-properties
pub async fn get_properties(query: SearchQuery, state: Arc<AppState>) -> Result<Response, Infallible> {
    let filters = match SearchFilters::from_query(&query, state.engine.config()) {
        Ok(filters) => filters,
        Err(e) => {
            state.engine.note_validation_failure();
            return Ok(error_reply(AppError::Validation(e), state.environment));
        }
    };

    Ok(match state.engine.search(&filters).await {
        Ok(result) => json(&SearchResponse::new(result, filters)).into_response(),
        Err(e) => search_error_reply(e, &state),
    })
}

/// GET /suggestions?q=
pub async fn suggestions(query: SuggestionQuery, state: Arc<AppState>) -> Result<Response, Infallible> {
    let q = query.q.unwrap_or_default();
    Ok(match state.engine.suggestions(&q).await {
        Ok(data) => json(&SuggestionsResponse { success: true, data }).into_response(),
        Err(e) => search_error_reply(e, &state),
    })
}

/// GET /health
pub async fn health(state: Arc<AppState>) -> Result<Response, Infallible> {
    let store = state.store.clone();
    let store_health = match tokio::task::spawn_blocking(move || store.ping()).await {
        Ok(Ok(())) => ComponentHealth::up(),
        Ok(Err(e)) => ComponentHealth::down(e.to_string()),
        Err(e) => ComponentHealth::down(e.to_string()),
    };
    let cache_health = match state.kv.ping() {
        Ok(()) => ComponentHealth::up(),
        Err(e) => ComponentHealth::down(e.to_string()),
    };

    let (status, code) = if !store_health.is_up() {
        ("unavailable", StatusCode::SERVICE_UNAVAILABLE)
    } else if !cache_health.is_up() {
        ("degraded", StatusCode::OK)
    } else {
        ("ok", StatusCode::OK)
    };

    let body = HealthResponse {
        status,
        store: store_health,
        cache: cache_health,
        snapshot: state.engine.snapshot().stats(),
        uptime_secs: state.uptime().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    };
    Ok(with_status(json(&body), code).into_response())
}

/// GET /metrics
pub async fn metrics(state: Arc<AppState>) -> Result<Response, Infallible> {
    let properties = state
        .engine
        .snapshot()
        .peek()
        .map(|snapshot| PropertyCounts {
            total: snapshot.records.len(),
            with_coordinates: snapshot.records.iter().filter(|p| p.has_coordinates()).count(),
        })
        .unwrap_or_default();

    let weather = state.engine.weather();
    let body = MetricsResponse {
        properties,
        search: state.engine.stats(),
        snapshot: state.engine.snapshot().stats(),
        weather_cache: weather.stats(),
        weather_entries: weather.len().ok(),
        provider: weather.fetcher().stats(),
        uptime_secs: state.uptime().as_secs(),
    };
    Ok(json(&body).into_response())
}

/// POST /admin/sync-all and /admin/sync-redis
pub async fn sync_all(state: Arc<AppState>) -> Result<Response, Infallible> {
    tracing::info!("Admin sync requested");
    Ok(match state.engine.snapshot().reload().await {
        Ok(snapshot) => json(&AdminResponse {
            success: true,
            message: format!("Snapshot reloaded (version {})", snapshot.version),
            count: snapshot.records.len(),
        })
        .into_response(),
        Err(e) => store_error_reply(e, &state),
    })
}

/// DELETE /admin/clear-cache
pub async fn clear_cache(state: Arc<AppState>) -> Result<Response, Infallible> {
    tracing::info!("Admin cache clear requested");
    state.engine.snapshot().invalidate();
    Ok(match state.engine.weather().flush() {
        Ok(removed) => json(&AdminResponse {
            success: true,
            message: "Caches cleared".to_string(),
            count: removed,
        })
        .into_response(),
        Err(e) => error_reply(AppError::Cache(e), state.environment),
    })
}

/// JSON bodies for unmatched routes and malformed requests.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };
    Ok(with_status(json(&ErrorResponse::new(message)), code).into_response())
}

fn search_error_reply(error: SearchError, state: &AppState) -> Response {
    error_reply(error.into(), state.environment)
}

fn store_error_reply(error: StoreError, state: &AppState) -> Response {
    error_reply(AppError::Store(error), state.environment)
}
