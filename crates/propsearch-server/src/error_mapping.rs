//! Maps application errors to HTTP status codes and JSON bodies.

use propsearch_core::{AppError, Environment};
use warp::http::StatusCode;
use warp::reply::{json, with_status, Response};
use warp::Reply;

use crate::responses::ErrorResponse;

pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the error body for `error`.
///
/// Validation messages are always shown as-is. Server faults carry the
/// underlying message in development and a generic one in production.
pub fn error_body(error: &AppError, environment: Environment) -> ErrorResponse {
    match error {
        AppError::Validation(e) => ErrorResponse {
            success: false,
            error: e.message.clone(),
            valid_conditions: e.valid_values.clone(),
        },
        other => match environment {
            Environment::Development => ErrorResponse::new(other.to_string()),
            Environment::Production => ErrorResponse::new(other.user_message()),
        },
    }
}

pub fn error_reply(error: AppError, environment: Environment) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    } else {
        tracing::debug!("Request rejected: {}", error);
    }
    with_status(json(&error_body(&error, environment)), status).into_response()
}
