use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gatewatch_core::CoreError;
use gatewatch_pipeline::PipelineError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`PipelineError`] for processing-plane errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses with a stable machine-readable `code`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A processing-plane error.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A domain validation error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Pipeline(p) => match p {
                PipelineError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("Job {id} not found"),
                ),
                PipelineError::AlreadyExists(_) => {
                    (StatusCode::CONFLICT, "ALREADY_EXISTS", p.to_string())
                }
                PipelineError::ResourceExhausted(_) => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RESOURCE_EXHAUSTED",
                    p.to_string(),
                ),
                PipelineError::InvalidState { .. } => {
                    (StatusCode::CONFLICT, "INVALID_STATE", p.to_string())
                }
                PipelineError::InvalidKind(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_KIND", p.to_string())
                }
                PipelineError::SourceUnavailable(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "SOURCE_UNAVAILABLE",
                    p.to_string(),
                ),
                PipelineError::Detector(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DETECTOR_ERROR",
                    p.to_string(),
                ),
                PipelineError::Store(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    p.to_string(),
                ),
                PipelineError::Core(e) => {
                    (StatusCode::BAD_REQUEST, "INVALID_INPUT", e.to_string())
                }
                PipelineError::Io(e) => {
                    tracing::error!(error = %e, "I/O error in handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Core(e) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", e.to_string()),

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "A storage error occurred".to_string(),
            )
        }
    }
}
