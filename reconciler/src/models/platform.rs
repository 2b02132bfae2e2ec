//! Platform identity and connection status

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External platform kinds managed by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    SourceControl,
    Hosting,
    Identity,
    DeviceMgmt,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::SourceControl,
        Platform::Hosting,
        Platform::Identity,
        Platform::DeviceMgmt,
    ];

    /// Stable key used in persisted rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::SourceControl => "source_control",
            Platform::Hosting => "hosting",
            Platform::Identity => "identity",
            Platform::DeviceMgmt => "device_mgmt",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Platform::SourceControl => "Source control",
            Platform::Hosting => "Hosting",
            Platform::Identity => "Identity",
            Platform::DeviceMgmt => "Device management",
        };
        f.write_str(label)
    }
}

/// Authentication state of one platform at one point in time.
///
/// Recomputed on every status query and only ever logged for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub platform: Platform,
    pub authenticated: bool,
    pub identity: Option<String>,
    pub last_checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ConnectionStatus {
    /// Authenticated status for the given identity
    pub fn connected(platform: Platform, identity: impl Into<String>) -> Self {
        Self {
            platform,
            authenticated: true,
            identity: Some(identity.into()),
            last_checked_at: Utc::now(),
            error: None,
        }
    }

    /// Unauthenticated status carrying the reason
    pub fn disconnected(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            platform,
            authenticated: false,
            identity: None,
            last_checked_at: Utc::now(),
            error: Some(error.into()),
        }
    }
}
