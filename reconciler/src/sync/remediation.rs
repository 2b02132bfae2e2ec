//! Bounded automated remediation
//!
//! Each issue of a report is attempted at most once per call through the
//! action registered for its kind. Failures are collected, never retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapters::{AdapterAction, AdapterSet, PlatformAdapter, PlatformSnapshot, RepositoryLink};
use crate::errors::ReconcilerError;
use crate::ledger::ErrorLedger;
use crate::models::deployment::DeploymentStatus;
use crate::models::platform::Platform;
use crate::models::sync_report::{Issue, IssueKind, SyncReport};
use crate::storage::event_log::{record, EventLog, ENTITY_REMEDIATION};
use crate::sync::detector::short_sha;
use crate::utils::with_timeout;

/// Fixed and failed issue strings of one remediation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub fixed: Vec<String>,
    pub failed: Vec<String>,
}

impl RemediationResult {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl From<RemediationResult> for api_models::FixResponse {
    fn from(result: RemediationResult) -> Self {
        Self {
            fixed: result.fixed,
            failed: result.failed,
        }
    }
}

/// A fix for one kind of issue
#[async_trait]
pub trait RemediationAction: Send + Sync {
    fn name(&self) -> &str;

    /// Apply the fix; returns the fixed-issue message
    async fn apply(&self, issue: &Issue, adapters: &AdapterSet) -> Result<String, ReconcilerError>;
}

/// Re-establish credentials of the issue's platform
pub struct ReAuthenticate;

#[async_trait]
impl RemediationAction for ReAuthenticate {
    fn name(&self) -> &str {
        "re_authenticate"
    }

    async fn apply(&self, issue: &Issue, adapters: &AdapterSet) -> Result<String, ReconcilerError> {
        let adapter = adapters.require(issue.platform)?;
        adapter.trigger_action(AdapterAction::ReAuthenticate).await?;

        let status = adapter.check_auth().await?;
        if !status.authenticated {
            return Err(ReconcilerError::AuthError(
                status.error.unwrap_or_else(|| "still not authenticated".to_string()),
            ));
        }
        Ok(format!("{} re-authenticated", issue.platform))
    }
}

/// Link the hosting project to its repository
pub struct RelinkRepository;

#[async_trait]
impl RemediationAction for RelinkRepository {
    fn name(&self) -> &str {
        "relink_repository"
    }

    async fn apply(&self, issue: &Issue, adapters: &AdapterSet) -> Result<String, ReconcilerError> {
        adapters
            .require(issue.platform)?
            .trigger_action(AdapterAction::LinkRepository)
            .await?;
        Ok(format!("{} project linked to repository", issue.platform))
    }
}

/// Deploy the source-control head from the branch source control tracks.
///
/// No-op when the latest hosting deployment is already built from that head.
pub struct TriggerDeployment;

#[async_trait]
impl RemediationAction for TriggerDeployment {
    fn name(&self) -> &str {
        "trigger_deployment"
    }

    async fn apply(&self, issue: &Issue, adapters: &AdapterSet) -> Result<String, ReconcilerError> {
        let source = adapters
            .require(Platform::SourceControl)?
            .get_current_state()
            .await?;
        let (repository, branch, head_revision) = match source {
            PlatformSnapshot::SourceControl {
                repository,
                branch,
                head_revision,
            } => (repository, branch, head_revision),
            other => {
                return Err(ReconcilerError::Internal(format!(
                    "source control returned a {} snapshot",
                    other.platform()
                )))
            }
        };

        let hosting = adapters.require(issue.platform)?;
        let (link, deployments) = hosting_state(hosting.as_ref()).await?;
        if let RepositoryLink::Linked(linked) = &link {
            if !linked.eq_ignore_ascii_case(&repository) {
                return Err(ReconcilerError::DriftError(format!(
                    "hosting project deploys {} but source control tracks {}",
                    linked, repository
                )));
            }
        }

        let latest = deployments.iter().max_by_key(|d| d.created_at);
        if let Some(latest) = latest {
            if latest.source_revision.as_deref() == Some(head_revision.as_str()) {
                return Ok(format!(
                    "{} deployment {} already at {}",
                    issue.platform,
                    latest.id,
                    short_sha(&head_revision)
                ));
            }
        }

        let outcome = hosting
            .trigger_action(AdapterAction::TriggerDeployment {
                git_ref: Some(branch.clone()),
            })
            .await?;
        Ok(match outcome.reference_id {
            Some(id) => format!("{} deployment {} triggered from {}", issue.platform, id, branch),
            None => format!("{} deployment triggered from {}", issue.platform, branch),
        })
    }
}

/// Rebuild a stuck deployment; no-op once it has left pending/building
pub struct Redeploy;

#[async_trait]
impl RemediationAction for Redeploy {
    fn name(&self) -> &str {
        "redeploy"
    }

    async fn apply(&self, issue: &Issue, adapters: &AdapterSet) -> Result<String, ReconcilerError> {
        let deployment_id = issue.deployment_id.clone().ok_or_else(|| {
            ReconcilerError::ValidationError("issue names no deployment".to_string())
        })?;

        let hosting = adapters.require(issue.platform)?;
        let (_, deployments) = hosting_state(hosting.as_ref()).await?;
        let still_stuck = deployments
            .iter()
            .any(|d| d.id == deployment_id && d.state.is_in_flight());
        if !still_stuck {
            return Ok(format!("Deployment {} is no longer in flight", deployment_id));
        }

        let outcome = hosting
            .trigger_action(AdapterAction::Redeploy {
                deployment_id: deployment_id.clone(),
            })
            .await?;
        Ok(match outcome.reference_id {
            Some(id) => format!("Deployment {} redeployed as {}", deployment_id, id),
            None => format!("Deployment {} redeployed", deployment_id),
        })
    }
}

async fn hosting_state(
    adapter: &dyn PlatformAdapter,
) -> Result<(RepositoryLink, Vec<DeploymentStatus>), ReconcilerError> {
    match adapter.get_current_state().await? {
        PlatformSnapshot::Hosting {
            link, deployments, ..
        } => Ok((link, deployments)),
        other => Err(ReconcilerError::Internal(format!(
            "{} returned a {} snapshot",
            adapter.name(),
            other.platform()
        ))),
    }
}

/// Remediation engine
pub struct RemediationEngine {
    adapters: AdapterSet,
    registry: HashMap<IssueKind, Arc<dyn RemediationAction>>,
    ledger: Arc<ErrorLedger>,
    event_log: Arc<dyn EventLog>,
    adapter_timeout: Duration,
}

impl RemediationEngine {
    /// Engine with the default action registry
    pub fn new(
        adapters: AdapterSet,
        ledger: Arc<ErrorLedger>,
        event_log: Arc<dyn EventLog>,
        adapter_timeout: Duration,
    ) -> Self {
        let mut registry: HashMap<IssueKind, Arc<dyn RemediationAction>> = HashMap::new();
        registry.insert(IssueKind::NotConnected, Arc::new(ReAuthenticate));
        registry.insert(IssueKind::RepositoryUnlinked, Arc::new(RelinkRepository));
        registry.insert(IssueKind::RevisionMismatch, Arc::new(TriggerDeployment));
        registry.insert(IssueKind::StuckDeployment, Arc::new(Redeploy));

        Self {
            adapters,
            registry,
            ledger,
            event_log,
            adapter_timeout,
        }
    }

    /// Replace the action registered for an issue kind
    pub fn with_action(mut self, kind: IssueKind, action: Arc<dyn RemediationAction>) -> Self {
        self.registry.insert(kind, action);
        self
    }

    /// Attempt every issue of the report once
    pub async fn remediate(&self, report: &SyncReport) -> RemediationResult {
        self.remediate_issues(&report.issues).await
    }

    /// Attempt the given issues once each, in order
    pub async fn remediate_issues(&self, issues: &[Issue]) -> RemediationResult {
        let mut result = RemediationResult::default();
        let mut attempted = HashSet::new();

        for issue in issues {
            if !attempted.insert((issue.platform, issue.kind, issue.deployment_id.clone())) {
                continue;
            }

            let Some(action) = self.registry.get(&issue.kind) else {
                let message = format!("{}: no remediation available", issue.message);
                info!("{}", message);
                result.failed.push(message);
                continue;
            };

            info!("Remediating '{}' with {}", issue.message, action.name());
            let applied = with_timeout(
                self.adapter_timeout,
                action.name(),
                action.apply(issue, &self.adapters),
            )
            .await;

            match applied {
                Ok(message) => {
                    self.ledger
                        .resolve_matching(issue.platform, issue.kind.as_str())
                        .await;
                    result.fixed.push(message);
                }
                Err(e) => {
                    let message = format!("{}: {}", issue.message, e);
                    warn!("Remediation failed: {}", message);
                    self.ledger
                        .log_unless_active(issue.platform, issue.kind.as_str(), &message)
                        .await;
                    result.failed.push(message);
                }
            }
        }

        if !issues.is_empty() {
            record(self.event_log.as_ref(), ENTITY_REMEDIATION, &result).await;
        }
        result
    }
}
