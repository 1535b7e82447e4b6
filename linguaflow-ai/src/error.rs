//! Error types for linguaflow-ai
//!
//! [`ImportError`] is the pipeline taxonomy; [`ApiError`] maps it (and
//! request-level problems) onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use linguaflow_common::api::ErrorResponse;
use thiserror::Error;

use crate::backend::BackendError;

/// Failures surfaced by the extraction pipeline
///
/// Unresolved media is deliberately absent: it degrades to a missing
/// `image`/`audio` field and never aborts an import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Bad extension or empty payload; raised before any resource exists
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Collection backend failed its startup probe
    #[error("Collection backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Archive could not be decoded or imported
    #[error("Failed to import archive: {0}")]
    ImportFailure(String),
}

impl From<BackendError> for ImportError {
    fn from(error: BackendError) -> Self {
        ImportError::ImportFailure(error.to_string())
    }
}

impl From<std::io::Error> for ImportError {
    fn from(error: std::io::Error) -> Self {
        ImportError::ImportFailure(format!("IO error: {}", error))
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Backend not usable in this process (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Archive import failed (500)
    #[error("Import failed: {0}")]
    ImportFailed(String),
}

impl From<ImportError> for ApiError {
    fn from(error: ImportError) -> Self {
        match error {
            ImportError::Validation(msg) => ApiError::BadRequest(msg),
            ImportError::BackendUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            ImportError::ImportFailure(msg) => ApiError::ImportFailed(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "BACKEND_UNAVAILABLE",
                msg,
            ),
            ApiError::ImportFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IMPORT_FAILED",
                msg,
            ),
        };

        (status, Json(ErrorResponse::new(error_code, message))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
