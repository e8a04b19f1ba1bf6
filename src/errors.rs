use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::{
    services::quota_ledger::QuotaCounter,
    storage::{Destination, StorageError},
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(QuotaCounter),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload timed out after {0:?}")]
    UploadTimeout(Duration),

    #[error("Upload to {failed} failed after the other destination succeeded: {source}")]
    PartialUpload {
        failed: Destination,
        #[source]
        source: StorageError,
    },

    #[error("Failed to persist photo record: {0}")]
    Persistence(#[source] Box<AppError>),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short label used as the `reason` dimension on failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Authorization(_) => "authorization",
            AppError::QuotaExceeded(_) => "quota_exceeded",
            AppError::Validation(_) => "validation",
            AppError::UploadTimeout(_) => "upload_timeout",
            AppError::PartialUpload { .. } => "partial_upload",
            AppError::Persistence(_) => "persistence",
            AppError::Database(_) => "database",
            AppError::Storage(_) => "storage",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            AppError::Authorization(ref msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::QuotaExceeded(counter) => {
                (StatusCode::PAYMENT_REQUIRED, format!("Quota exceeded: {}", counter))
            }
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UploadTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "Upload timed out".to_string())
            }
            AppError::PartialUpload { ref failed, ref source } => {
                tracing::error!(destination = %failed, error = %source, "Partial upload failure");
                (StatusCode::BAD_GATEWAY, "Storage error".to_string())
            }
            AppError::Persistence(ref e) => {
                tracing::error!("Persistence error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Storage(ref e) => {
                tracing::error!("Storage error: {}", e);
                (StatusCode::BAD_GATEWAY, "Storage error".to_string())
            }
            AppError::Config(ref msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
