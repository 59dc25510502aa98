use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Failures raised by the scoring core.
///
/// Neither variant is retried: artifact problems abort startup, and a scoring
/// failure is deterministic for the same input.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The classifier or column artifact is missing, unreadable or structurally incompatible.
    ArtifactLoad(String),
    /// The classifier could not produce a probability for an aligned feature vector.
    Scoring(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ArtifactLoad(msg) => write!(f, "Artifact load error: {}", msg),
            EngineError::Scoring(msg) => write!(f, "Scoring error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Application-specific error types for the HTTP layer.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Bad request error (invalid or incomplete applicant input).
    BadRequest(String),
    /// The engine failed while scoring this request.
    Engine(EngineError),
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Engine(e) => write!(f, "{}", e),
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Validation problems are echoed to the caller as-is. Engine failures are
    /// surfaced with their message so the caller knows no score was produced.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => {
                tracing::warn!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Engine(e) => {
                tracing::error!("Engine error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for AppError {
    /// Converts an `EngineError` into an `AppError`.
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

impl From<serde_json::Error> for AppError {
    /// Converts a decode failure of the applicant body into a `BadRequest`.
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("Invalid applicant record: {}", err))
    }
}
