//! Error taxonomy for the aggregation pipeline and the serving layer.
//!
//! Only `PersistenceError` is fatal to a scheduler cycle. Collection and
//! scoring errors degrade the batch, cache errors degrade to a direct read,
//! and `ServeError::NotReady` is how "no data yet" reaches clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

/// A single source could not be fetched or parsed. The source is skipped.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("source {source_name} timed out after {after:?}")]
    Timeout { source_name: String, after: Duration },

    #[error("source {source_name} http error: {message}")]
    Http {
        source_name: String,
        message: String,
    },

    #[error("source {source_name} returned malformed feed: {message}")]
    Malformed {
        source_name: String,
        message: String,
    },
}

/// The scoring oracle could not produce a usable response.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring oracle is not configured")]
    Unavailable,

    #[error("scoring oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring oracle transport error: {0}")]
    Transport(String),

    #[error("scoring oracle answered with status {0}")]
    Status(u16),

    #[error("scoring oracle returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for ScoringError {
    fn from(e: reqwest::Error) -> Self {
        ScoringError::Transport(e.to_string())
    }
}

/// Writing to or reading from the snapshot log failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("metadata encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

/// The cache backend misbehaved. Never surfaced to clients.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("no sentiment data available")]
    NotReady,

    #[error("{0}")]
    BadRequest(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServeError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ServeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServeError::Persistence(e) => {
                tracing::error!(error = %e, "serving request failed on persistence");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServeError::Internal(e) => {
                tracing::error!(error = %e, "serving request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            ServeError::Persistence(_) | ServeError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}
