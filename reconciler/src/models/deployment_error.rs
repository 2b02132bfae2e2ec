//! Deployment error ledger records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::platform::Platform;

/// Error lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatus {
    Active,
    Resolved,
    Ignored,
}

/// A platform error recorded for operator review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentError {
    pub id: String,
    pub platform: Platform,
    pub error_type: String,
    pub message: String,
    pub status: ErrorStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Active error annotated for the operator listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveErrorView {
    #[serde(flatten)]
    pub error: DeploymentError,

    /// No issue for this platform in the most recent sync report
    pub stale: bool,
}
