//! Search-level error types.

use propsearch_core::{AppError, StoreError, ValidationError};
use thiserror::Error;

/// The only errors a search can surface.
///
/// Provider and cache failures are absorbed below this layer.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Property store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Validation(e) => AppError::Validation(e),
            SearchError::StoreUnavailable(e) => AppError::Store(e),
        }
    }
}
