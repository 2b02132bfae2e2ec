//! Drift detection
//!
//! Turns per-platform observations into a [`SyncReport`]. Checks run in a
//! fixed order and each yields at most one issue per platform.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::adapters::{PlatformSnapshot, RepositoryLink};
use crate::models::deployment::DeploymentStatus;
use crate::models::platform::{ConnectionStatus, Platform};
use crate::models::sync_report::{Issue, IssueKind, Overall, SyncReport};

/// What the aggregator learned about one platform
#[derive(Debug, Clone)]
pub struct PlatformObservation {
    pub status: ConnectionStatus,

    /// False when the platform could not be reached or timed out
    pub reachable: bool,

    /// Current state, when it could be read
    pub snapshot: Option<PlatformSnapshot>,

    /// Why the state read failed on an authenticated platform
    pub state_error: Option<String>,
}

impl PlatformObservation {
    pub fn platform(&self) -> Platform {
        self.status.platform
    }
}

/// Drift detector
#[derive(Debug, Clone)]
pub struct DriftDetector {
    stale_build: chrono::Duration,
}

impl DriftDetector {
    /// `stale_build`: in-flight deployments older than this are stuck
    pub fn new(stale_build: Duration) -> Self {
        Self {
            stale_build: chrono::Duration::from_std(stale_build)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
        }
    }

    /// Build a fresh report from observations
    pub fn detect(&self, observations: &[PlatformObservation], now: DateTime<Utc>) -> SyncReport {
        let mut issues = Vec::new();

        for observation in observations {
            if let Some(issue) = connectivity_issue(observation) {
                issues.push(issue);
            }
        }

        let head = observations.iter().find_map(|o| match &o.snapshot {
            Some(PlatformSnapshot::SourceControl { head_revision, .. }) => Some(head_revision.as_str()),
            _ => None,
        });
        for observation in observations {
            if let Some(PlatformSnapshot::Hosting {
                project,
                link,
                deployments,
            }) = &observation.snapshot
            {
                if let Some(issue) = hosting_issue(project, link, deployments, head) {
                    issues.push(issue);
                }
            }
        }

        for observation in observations {
            if let Some(PlatformSnapshot::Hosting { deployments, .. }) = &observation.snapshot {
                if let Some(issue) = self.stuck_issue(observation.platform(), deployments, now) {
                    issues.push(issue);
                }
            }
        }

        let overall = if issues.iter().any(|i| i.kind.is_connectivity()) {
            Overall::Errored
        } else if !issues.is_empty() {
            Overall::Drifted
        } else {
            Overall::Synced
        };

        let status_by_platform: BTreeMap<_, _> = observations
            .iter()
            .map(|o| (o.platform(), o.status.clone()))
            .collect();

        SyncReport {
            status_by_platform,
            overall,
            issues,
            generated_at: now,
        }
    }

    /// Oldest deployment still pending or building past the threshold
    fn stuck_issue(
        &self,
        platform: Platform,
        deployments: &[DeploymentStatus],
        now: DateTime<Utc>,
    ) -> Option<Issue> {
        let stuck = deployments
            .iter()
            .filter(|d| d.state.is_in_flight() && now - d.created_at > self.stale_build)
            .min_by_key(|d| d.created_at)?;

        let hours = (now - stuck.created_at).num_hours();
        Some(
            Issue::new(
                platform,
                IssueKind::StuckDeployment,
                format!(
                    "Deployment {} has been {} for {}h",
                    stuck.id,
                    stuck.state.as_str(),
                    hours
                ),
            )
            .with_deployment(&stuck.id),
        )
    }
}

fn connectivity_issue(observation: &PlatformObservation) -> Option<Issue> {
    let platform = observation.platform();
    if !observation.reachable {
        let reason = observation.status.error.as_deref().unwrap_or("no response");
        return Some(Issue::new(
            platform,
            IssueKind::Unreachable,
            format!("{} unreachable: {}", platform, reason),
        ));
    }
    if !observation.status.authenticated {
        return Some(Issue::new(
            platform,
            IssueKind::NotConnected,
            format!("{} not connected", platform),
        ));
    }
    if let Some(reason) = &observation.state_error {
        return Some(Issue::new(
            platform,
            IssueKind::StateUnreadable,
            format!("{} state unreadable: {}", platform, reason),
        ));
    }
    None
}

fn hosting_issue(
    project: &str,
    link: &RepositoryLink,
    deployments: &[DeploymentStatus],
    head: Option<&str>,
) -> Option<Issue> {
    if *link == RepositoryLink::Unlinked {
        return Some(Issue::new(
            Platform::Hosting,
            IssueKind::RepositoryUnlinked,
            format!("Hosting project {} is not linked to a repository", project),
        ));
    }

    let head = head?;
    let latest = deployments.iter().max_by_key(|d| d.created_at)?;
    let revision = latest.source_revision.as_deref()?;
    if revision == head {
        return None;
    }

    Some(
        Issue::new(
            Platform::Hosting,
            IssueKind::RevisionMismatch,
            format!(
                "Latest deployment {} is at {} but source control head is {}",
                latest.id,
                short_sha(revision),
                short_sha(head)
            ),
        )
        .with_deployment(&latest.id),
    )
}

/// First seven characters of a revision
pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
