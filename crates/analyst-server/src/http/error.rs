use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::orchestrator::OrchestratorError;

/// Closed set of HTTP-facing error shapes. Internal failures never leak
/// their `Display` text past `tracing::error!` — callers get a generic
/// message plus a classifiable `error_type`.
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "unhandled request error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RUNNER_INTERNAL_ERROR",
                    "internal error".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({ "error_type": error_type, "message": message })),
        )
            .into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::DatasetNotFound(id) => {
                ApiError::NotFound(format!("unknown dataset: {id}"))
            }
            OrchestratorError::Internal(err) => ApiError::Internal(err),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}
