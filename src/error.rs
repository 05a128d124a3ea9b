// Error taxonomy shared by the core and its HTTP boundary

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced track, user or other entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed or missing required field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The write would duplicate something that must be unique
    #[error("{0}")]
    Conflict(String),

    /// Identity missing or not recognised
    #[error("Unauthorized")]
    Unauthorized,

    /// Storage cannot be reached at all
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Storage did not answer within the configured budget
    #[error("Storage did not respond in time")]
    Timeout,

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Unavailable(_) | AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may simply try again later
    pub fn is_retryable(&self) -> bool {
        self.status_code() == StatusCode::SERVICE_UNAVAILABLE
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        // Storage internals stay in the log
        let message = match &self {
            AppError::Storage(_) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
