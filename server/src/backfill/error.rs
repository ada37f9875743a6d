//! Backfill task errors (§7).
//!
//! Unlike the HTTP-facing error enums, most of this error's variants are
//! never seen by an HTTP client directly — the worker catches them,
//! truncates the message, and stores it on the task row (§4.4 step 6).
//! The `IntoResponse` impl exists for the explicit-enqueue and
//! task-lookup HTTP endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for BackfillError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::Database(e) => {
                tracing::error!(error = %e, "database error in backfill task layer");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        let message = match &self {
            Self::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

pub type BackfillResult<T> = Result<T, BackfillError>;

/// Truncate an error message to the 500-char limit the task row enforces
/// (§4.4 step 6).
#[must_use]
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= 500 {
        message.to_string()
    } else {
        message.chars().take(500).collect()
    }
}
