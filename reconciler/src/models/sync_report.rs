//! Sync report models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::platform::{ConnectionStatus, Platform};

/// Overall consistency verdict. Ordered so that `max` picks the dominant one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overall {
    Synced,
    Drifted,
    Errored,
}

/// Category of a detected issue, used to pick a remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Reachable but not authenticated
    NotConnected,
    /// Transport failure or timeout
    Unreachable,
    /// Hosting project has no linked repository
    RepositoryUnlinked,
    /// Deployed revision differs from the source head
    RevisionMismatch,
    /// Deployment pending or building for longer than the staleness threshold
    StuckDeployment,
    /// Authenticated but the current state could not be read
    StateUnreadable,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::NotConnected => "not_connected",
            IssueKind::Unreachable => "unreachable",
            IssueKind::RepositoryUnlinked => "repository_unlinked",
            IssueKind::RevisionMismatch => "revision_mismatch",
            IssueKind::StuckDeployment => "stuck_deployment",
            IssueKind::StateUnreadable => "state_unreadable",
        }
    }

    /// Whether the issue makes the report `errored` rather than `drifted`
    pub fn is_connectivity(&self) -> bool {
        matches!(self, IssueKind::NotConnected | IssueKind::Unreachable)
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One itemized finding of the drift detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub platform: Platform,
    pub kind: IssueKind,
    pub message: String,

    /// Deployment the issue refers to, for deployment-level findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

impl Issue {
    pub fn new(platform: Platform, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            platform,
            kind,
            message: message.into(),
            deployment_id: None,
        }
    }

    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A freshly computed snapshot of cross-platform consistency.
///
/// Never merged with an earlier report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub status_by_platform: BTreeMap<Platform, ConnectionStatus>,
    pub overall: Overall,
    pub issues: Vec<Issue>,
    pub generated_at: DateTime<Utc>,
}

impl SyncReport {
    /// Issue strings in detection order
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }

    /// Issues raised against one platform
    pub fn issues_for(&self, platform: Platform) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.platform == platform)
    }

    pub fn is_synced(&self) -> bool {
        self.overall == Overall::Synced
    }
}
