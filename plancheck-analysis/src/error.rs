//! Error types for plancheck-analysis
//!
//! `AnalysisError` is the pipeline taxonomy. Provider-side failures
//! (`Provider`, `ProviderTimeout`, `MalformedResult`) are recorded on the
//! analysis record as `failed` and never reach a caller; only structural
//! errors are converted into an `ApiError` response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::models::AnalysisStatus;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// State change not permitted by the state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: AnalysisStatus,
        to: AnalysisStatus,
    },

    /// Referenced document, project, or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Analysis type is not configured
    #[error("Unknown analysis type: {0}")]
    UnknownAnalysisType(String),

    /// Provider returned an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider exceeded its deadline
    #[error("Provider timed out after {}s", .0.as_secs_f64())]
    ProviderTimeout(Duration),

    /// Provider payload could not be interpreted
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] plancheck_common::Error),
}

impl From<sqlx::Error> for AnalysisError {
    fn from(err: sqlx::Error) -> Self {
        AnalysisError::Storage(plancheck_common::Error::Database(err))
    }
}

/// Pipeline result type
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// plancheck-common error
    #[error("Common error: {0}")]
    Common(#[from] plancheck_common::Error),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::NotFound(msg) => ApiError::NotFound(msg),
            AnalysisError::UnknownAnalysisType(name) => {
                ApiError::BadRequest(format!("Unknown analysis type: {}", name))
            }
            AnalysisError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            AnalysisError::Storage(inner) => ApiError::Common(inner),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(plancheck_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(plancheck_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "Request failed with storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", err.to_string())
            }
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
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError::from(AnalysisError::NotFound("record".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unknown_type_maps_to_400() {
        let response =
            ApiError::from(AnalysisError::UnknownAnalysisType("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_transition_maps_to_409() {
        let err = AnalysisError::InvalidTransition {
            from: AnalysisStatus::Completed,
            to: AnalysisStatus::Processing,
        };
        assert_eq!(err.to_string(), "Invalid transition: completed -> processing");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_timeout_message_names_timeout() {
        let err = AnalysisError::ProviderTimeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Provider timed out after 1.5s");
    }
}
