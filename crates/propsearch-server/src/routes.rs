use std::convert::Infallible;
use std::sync::Arc;

use propsearch_services::SearchQuery;
use warp::Filter;

use crate::handlers::{self, SuggestionQuery};
use crate::state::AppState;

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Every route of the HTTP API, with CORS and request logging.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // Paths are matched before methods so an unknown path is a 404, not a 405.
    let get_properties = warp::path!("get-properties")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::get_properties);

    let suggestions = warp::path!("suggestions")
        .and(warp::get())
        .and(warp::query::<SuggestionQuery>())
        .and(with_state(state.clone()))
        .and_then(handlers::suggestions);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::health);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::metrics);

    let sync = warp::path!("admin" / "sync-all")
        .or(warp::path!("admin" / "sync-redis"))
        .unify()
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(handlers::sync_all);

    let clear_cache = warp::path!("admin" / "clear-cache")
        .and(warp::delete())
        .and(with_state(state))
        .and_then(handlers::clear_cache);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    get_properties
        .or(suggestions)
        .or(health)
        .or(metrics)
        .or(sync)
        .or(clear_cache)
        .recover(handlers::handle_rejection)
        .with(cors)
        .with(warp::log("propsearch::http"))
}
