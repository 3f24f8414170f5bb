//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry
//! before responding to the client. All route handlers should return
//! `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::discogs::DiscogsError;
use crate::services::OrderError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Marketplace API operation failed.
    #[error("Marketplace error: {0}")]
    Marketplace(#[from] DiscogsError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::Marketplace(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Marketplace(err) => match err {
                DiscogsError::NotFound(_) => StatusCode::NOT_FOUND,
                DiscogsError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Order(err) => match err {
                OrderError::NotFound => StatusCode::NOT_FOUND,
                OrderError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Marketplace(err) => match err {
                DiscogsError::NotFound(_) => "Record not found".to_string(),
                DiscogsError::RateLimited(_) => "Too many requests".to_string(),
                _ => "Marketplace temporarily unavailable".to_string(),
            },
            Self::Order(err) => match err {
                OrderError::NotFound => "Order not found".to_string(),
                OrderError::Store(_) => "Internal server error".to_string(),
                other => other.to_string(),
            },
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
