use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("window expired ({window_minutes} minutes)")]
    Expired { window_minutes: i64 },

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Returns whether this error is retryable (e.g. pool timeout, backing
    /// service unavailable). Callers decide whether to retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Transient(_) => true,
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Short machine-readable kind, used in error payloads on the live
    /// connection and in the HTTP error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) | AppError::StartServer(_) => "server_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Expired { .. } => "expired",
            AppError::Decryption(_) => "decryption_error",
            AppError::Transient(_) => "transient",
            AppError::Serialization(_) => "server_error",
            AppError::Database(_) => {
                if self.is_retryable() {
                    "transient"
                } else {
                    "database_error"
                }
            }
            AppError::Internal => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::Expired { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error body returned to HTTP callers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub message: String,
    pub status: u16,
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            code: self.kind(),
            message: self.to_string(),
            status: status.as_u16(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
