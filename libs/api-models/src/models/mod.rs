//! Reconciler API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope wrapping every API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    /// Successful response without a message
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Response whose success flag is decided by the caller
    pub fn with_outcome(success: bool, data: T, message: impl Into<String>) -> Self {
        Self {
            success,
            data,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Remediation response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixResponse {
    pub fixed: Vec<String>,
    pub failed: Vec<String>,
}

/// Purge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeRequest {
    /// Age in days; falls back to the configured retention when absent
    pub days: Option<u32>,
}

/// Purge response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub deleted: usize,
    /// Event log rows dropped past the cutoff
    #[serde(default)]
    pub compacted: usize,
}

/// Deployment trigger request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub branch: Option<String>,
}

/// Deployment rollback request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub deployment_id: Option<String>,
}

/// Deployment validation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub url: String,
}
