//! HTTP surface for property search.

pub mod error_mapping;
pub mod handlers;
pub mod responses;
pub mod routes;
pub mod state;

pub use routes::routes;
pub use state::AppState;
