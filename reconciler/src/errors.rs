//! Error types for the reconciler

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use api_models::ErrorResponse;

/// Main error type for the reconciler
#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Adapter unreachable or timed out
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Adapter reachable but not authenticated
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Reachable and authenticated but platforms disagree in a way no action can fix
    #[error("Drift error: {0}")]
    DriftError(String),

    /// A phase body failed to apply a change
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed request, rejected before any adapter call
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Setup already in progress: {0}")]
    SetupInProgress(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReconcilerError {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ReconcilerError::IoError(_) => "io_error",
            ReconcilerError::JsonError(_) => "json_error",
            ReconcilerError::HttpError(_) => "http_error",
            ReconcilerError::TransportError(_) => "transport_error",
            ReconcilerError::AuthError(_) => "auth_error",
            ReconcilerError::DriftError(_) => "drift_error",
            ReconcilerError::ConfigError(_) => "configuration_error",
            ReconcilerError::ValidationError(_) => "validation_error",
            ReconcilerError::SetupInProgress(_) => "setup_in_progress",
            ReconcilerError::StorageError(_) => "storage_error",
            ReconcilerError::ServerError(_) => "server_error",
            ReconcilerError::ShutdownError(_) => "shutdown_error",
            ReconcilerError::NotFound(_) => "not_found",
            ReconcilerError::Internal(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ReconcilerError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ReconcilerError::NotFound(_) => StatusCode::NOT_FOUND,
            ReconcilerError::SetupInProgress(_) => StatusCode::CONFLICT,
            ReconcilerError::AuthError(_) => StatusCode::UNAUTHORIZED,
            ReconcilerError::TransportError(_) | ReconcilerError::HttpError(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ReconcilerError {
    fn from(err: anyhow::Error) -> Self {
        ReconcilerError::Internal(err.to_string())
    }
}

impl IntoResponse for ReconcilerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.code().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
