//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::LedgerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Ledger errors
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // Ledger errors - map to appropriate HTTP status
            AppError::Ledger(ref ledger_err) => match ledger_err {
                LedgerError::AccountNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "account_not_found",
                    Some(id.to_string()),
                ),
                LedgerError::AccountClosed(id) => (
                    StatusCode::BAD_REQUEST,
                    "account_closed",
                    Some(id.to_string()),
                ),
                LedgerError::InsufficientFunds { .. } => (
                    StatusCode::BAD_REQUEST,
                    "insufficient_funds",
                    Some(ledger_err.to_string()),
                ),
                LedgerError::InvalidAmount(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                }
                LedgerError::SameAccount => {
                    (StatusCode::BAD_REQUEST, "same_account_transfer", None)
                }
                LedgerError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "operation_timeout", None),
                LedgerError::StoreConflict => (StatusCode::CONFLICT, "store_conflict", None),
                LedgerError::StoreUnavailable(msg) => {
                    tracing::error!("Store unavailable: {}", msg);
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
                }
            },

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
