//! Application error types.
//!
//! Every service operation reports failures through [`AppError`]. Driver
//! errors pass through untouched; only validation and not-found failures are
//! produced by the management layer itself.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across all services.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service could not be constructed (missing handle, bad options).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller supplied invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested object does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The verb is intentionally not supported by the service.
    #[error("method '{0}' is not implemented")]
    NotImplemented(&'static str),

    /// Error raised by the MongoDB driver.
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),
}

impl AppError {
    /// Builds the not-found error for an identity that did not resolve.
    pub fn record_not_found(id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("No record found for id '{}'", id))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Configuration(_) | AppError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NotImplemented(_) => "NOT_IMPLEMENTED",
            AppError::Driver(_) => "DATABASE_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.error_code(), error = %self, "request rejected");
        }

        let body = ApiResponse::err(self.error_code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
