//! Centralized error types for the property search service.
//!
//! This module provides a typed error hierarchy that:
//! - Separates client faults (validation) from dependency faults (store, cache)
//! - Provides messages suitable for API responses
//! - Preserves full error context for logging

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a message that is safe to show API clients.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl AppError {
    /// Returns a message suitable for API clients.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "The request contains invalid parameters.",
            AppError::Store(e) => e.user_message(),
            AppError::Cache(e) => e.user_message(),
        }
    }
}

/// A request parameter was out of range or not one of the accepted values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// Name of the offending parameter as the client sent it.
    pub field: String,
    pub message: String,
    /// Accepted values, for enum-like parameters.
    pub valid_values: Option<Vec<String>>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            valid_values: None,
        }
    }

    /// A range violation, e.g. `tempMin must be between -20 and 50`.
    pub fn out_of_range(field: &str, min: impl std::fmt::Display, max: impl std::fmt::Display) -> Self {
        Self::new(field, format!("{} must be between {} and {}", field, min, max))
    }

    pub fn with_valid_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Source-of-truth store errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl StoreError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "Property data is temporarily unavailable.",
            StoreError::QueryFailed(_) => "Failed to load properties. Please try again.",
        }
    }
}

/// Key-value cache backend errors.
///
/// These are never fatal for a request; callers fall back to direct computation.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CacheError::Unavailable(_) => "Cache unavailable; results may be slower.",
            CacheError::Serialization(_) => "Cached data was unreadable and was ignored.",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Extension trait for converting rusqlite errors to store errors.
pub trait RusqliteErrorExt {
    fn into_store_error(self) -> StoreError;
    fn into_cache_error(self) -> CacheError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_store_error(self) -> StoreError {
        match &self {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::NotADatabase
                ) =>
            {
                StoreError::Unavailable(self.to_string())
            }
            _ => StoreError::QueryFailed(self.to_string()),
        }
    }

    fn into_cache_error(self) -> CacheError {
        CacheError::Unavailable(self.to_string())
    }
}
