//! Platform adapters
//!
//! Every external platform is reached through [`PlatformAdapter`]. The
//! aggregator, remediation engine and setup phases only ever see this trait.

pub mod cli_output;
pub mod device_mgmt;
pub mod hosting;
pub mod hosting_cli;
pub mod identity;
pub mod source_control;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ReconcilerError;
use crate::models::deployment::{DeploymentState, DeploymentStatus};
use crate::models::platform::{ConnectionStatus, Platform};
use crate::storage::settings::{BrandingSettings, CompliancePolicySettings};

/// Capability surface of one external platform
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter serves
    fn platform(&self) -> Platform;

    /// Human-readable adapter name for logs
    fn name(&self) -> &str;

    /// Check credentials.
    ///
    /// A reachable platform that rejects the credentials yields
    /// `Ok(status)` with `authenticated == false`. Transport failures are
    /// returned as errors.
    async fn check_auth(&self) -> Result<ConnectionStatus, ReconcilerError>;

    /// Read the platform's current state
    async fn get_current_state(&self) -> Result<PlatformSnapshot, ReconcilerError>;

    /// Apply one change. Actions are idempotent.
    async fn trigger_action(&self, action: AdapterAction)
        -> Result<ActionOutcome, ReconcilerError>;
}

/// Whether the hosting project is linked to a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "repository", rename_all = "snake_case")]
pub enum RepositoryLink {
    Linked(String),
    Unlinked,
    /// The adapter cannot observe the link
    Unknown,
}

/// Current state of one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformSnapshot {
    SourceControl {
        repository: String,
        branch: String,
        head_revision: String,
    },
    Hosting {
        project: String,
        link: RepositoryLink,
        /// Most recent first
        deployments: Vec<DeploymentStatus>,
    },
    Identity {
        tenant: String,
        groups: Vec<String>,
    },
    DeviceMgmt {
        mdm_authority: Option<String>,
        policies: Vec<String>,
        managed_device_count: usize,
    },
}

impl PlatformSnapshot {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformSnapshot::SourceControl { .. } => Platform::SourceControl,
            PlatformSnapshot::Hosting { .. } => Platform::Hosting,
            PlatformSnapshot::Identity { .. } => Platform::Identity,
            PlatformSnapshot::DeviceMgmt { .. } => Platform::DeviceMgmt,
        }
    }
}

/// A change requested from an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterAction {
    /// Refresh or re-establish credentials
    ReAuthenticate,
    /// Link the hosting project to its configured repository
    LinkRepository,
    /// Build and deploy a ref; the default branch when `None`
    TriggerDeployment { git_ref: Option<String> },
    /// Rebuild an existing deployment
    Redeploy { deployment_id: String },
    /// Promote an earlier deployment; the previous ready one when `None`
    Rollback { deployment_id: Option<String> },
    EnsureGroup {
        display_name: String,
        description: String,
    },
    EnsureCompliancePolicy(CompliancePolicySettings),
    ConfigureBranding(BrandingSettings),
}

impl AdapterAction {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterAction::ReAuthenticate => "re_authenticate",
            AdapterAction::LinkRepository => "link_repository",
            AdapterAction::TriggerDeployment { .. } => "trigger_deployment",
            AdapterAction::Redeploy { .. } => "redeploy",
            AdapterAction::Rollback { .. } => "rollback",
            AdapterAction::EnsureGroup { .. } => "ensure_group",
            AdapterAction::EnsureCompliancePolicy(_) => "ensure_compliance_policy",
            AdapterAction::ConfigureBranding(_) => "configure_branding",
        }
    }
}

/// Result of an adapter action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub accepted: bool,

    /// Id of the resource the action touched or produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,

    /// The action created a resource that did not exist before
    pub created: bool,
}

impl ActionOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reference_id: None,
            created: false,
        }
    }

    pub fn created(reference_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reference_id: Some(reference_id.into()),
            created: true,
        }
    }

    pub fn existing(reference_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reference_id: Some(reference_id.into()),
            created: false,
        }
    }
}

/// Error for an action the adapter does not support
pub fn unsupported(adapter: &str, action: &AdapterAction) -> ReconcilerError {
    ReconcilerError::ConfigError(format!(
        "{} does not support action {}",
        adapter,
        action.name()
    ))
}

/// Map an auth failure onto a disconnected status; other errors pass through
pub fn auth_outcome(
    platform: Platform,
    result: Result<String, ReconcilerError>,
) -> Result<ConnectionStatus, ReconcilerError> {
    match result {
        Ok(identity) => Ok(ConnectionStatus::connected(platform, identity)),
        Err(ReconcilerError::AuthError(msg)) => Ok(ConnectionStatus::disconnected(platform, msg)),
        Err(e) => Err(e),
    }
}

/// Previous ready deployment, skipping the most recent ready one
pub fn rollback_target(deployments: &[DeploymentStatus]) -> Option<&DeploymentStatus> {
    let mut ready: Vec<&DeploymentStatus> = deployments
        .iter()
        .filter(|d| d.state == DeploymentState::Ready)
        .collect();
    ready.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ready.get(1).copied()
}

/// Configured adapters keyed by platform
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: BTreeMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any earlier one for the same platform
    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<&Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform)
    }

    /// Adapter for a platform, or a configuration error naming it
    pub fn require(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>, ReconcilerError> {
        self.get(platform).ok_or_else(|| {
            ReconcilerError::ConfigError(format!("{} is not configured", platform))
        })
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn deployment(id: &str, state: DeploymentState, age_hours: i64) -> DeploymentStatus {
        let mut d = DeploymentStatus::triggered(id, Platform::Hosting);
        d.state = state;
        d.created_at = Utc::now() - Duration::hours(age_hours);
        d
    }

    #[test]
    fn test_rollback_target_skips_current_ready() {
        let deployments = vec![
            deployment("d4", DeploymentState::Error, 1),
            deployment("d3", DeploymentState::Ready, 2),
            deployment("d2", DeploymentState::Ready, 5),
            deployment("d1", DeploymentState::Ready, 9),
        ];

        assert_eq!(rollback_target(&deployments).unwrap().id, "d2");
        assert!(rollback_target(&deployments[..2]).is_none());
    }

    #[test]
    fn test_auth_outcome() {
        let status = auth_outcome(Platform::Hosting, Err(ReconcilerError::AuthError("bad token".into())))
            .unwrap();
        assert!(!status.authenticated);
        assert_eq!(status.error.as_deref(), Some("bad token"));

        assert!(auth_outcome(
            Platform::Hosting,
            Err(ReconcilerError::TransportError("down".into()))
        )
        .is_err());

        let ok = auth_outcome(Platform::Identity, Ok("Contoso".into())).unwrap();
        assert!(ok.authenticated);
        assert_eq!(ok.identity.as_deref(), Some("Contoso"));
    }

    #[test]
    fn test_snapshot_serialization_is_tagged() {
        let snapshot = PlatformSnapshot::SourceControl {
            repository: "acme/portal".into(),
            branch: "main".into(),
            head_revision: "abc".into(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["platform"], "source_control");
        assert_eq!(snapshot.platform(), Platform::SourceControl);
    }
}
