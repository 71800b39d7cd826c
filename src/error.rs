//! Error types for gammon-quiz
//!
//! Domain errors use thiserror for clear propagation; the HTTP layer has its
//! own `ApiError` that maps the taxonomy onto status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the core pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration resolution errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Whole-transcript parse failure
    #[error("Unparseable transcript: {0}")]
    Unparseable(String),

    /// Engine launch or protocol errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Source-site crawl errors
    #[error("Source site error: {0}")]
    Site(String),

    /// Malformed position or match identifier
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// JSON document (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the gammon-quiz Error
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP-facing error type
///
/// Maps the error taxonomy to status codes: 401 unauthorized, 400 bad
/// request, 404 not found, everything else 500.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Missing or mistyped body fields (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown quiz id or job id (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unrecoverable storage or pipeline failure (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidId(msg) | Error::Config(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "missing or invalid credentials".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
