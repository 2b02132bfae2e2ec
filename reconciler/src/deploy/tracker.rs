//! Deployment tracker
//!
//! Holds the deployment records created by trigger actions and keeps them
//! current from hosting polls. Terminal records never change.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::adapters::{ActionOutcome, AdapterAction, AdapterSet, PlatformSnapshot};
use crate::errors::ReconcilerError;
use crate::models::deployment::{DeploymentState, DeploymentStatus, DeploymentUpdate};
use crate::models::platform::Platform;
use crate::storage::event_log::{record, EventLog, ENTITY_DEPLOYMENT};
use crate::utils::with_timeout;

/// Records considered by the metrics
const METRICS_WINDOW: usize = 100;

/// CI/CD metrics over the most recent deployments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentMetrics {
    /// Deployments per day across the window
    pub deployment_frequency: f64,
    /// Percentage of deployments that reached `ready`
    pub success_rate: f64,
    /// Percentage of deployments that ended in `error`
    pub failure_rate: f64,
    pub average_build_secs: f64,
    pub last_deployment: Option<DateTime<Utc>>,
    pub total_deployments: usize,
}

/// Deployment tracker
pub struct DeploymentTracker {
    adapters: AdapterSet,
    event_log: Arc<dyn EventLog>,
    adapter_timeout: Duration,
    deployments: RwLock<Vec<DeploymentStatus>>,
}

impl DeploymentTracker {
    pub fn new(
        adapters: AdapterSet,
        event_log: Arc<dyn EventLog>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            event_log,
            adapter_timeout,
            deployments: RwLock::new(Vec::new()),
        }
    }

    /// Replay recorded deployment rows; the last row of each id wins
    pub async fn load(&self) -> Result<usize, ReconcilerError> {
        let rows = self.event_log.read_all(ENTITY_DEPLOYMENT).await?;
        let mut deployments = self.deployments.write().await;

        for row in rows {
            match serde_json::from_value::<DeploymentStatus>(row.payload) {
                Ok(status) => upsert(&mut deployments, status),
                Err(e) => warn!("Skipping malformed deployment row: {}", e),
            }
        }
        sort_newest_first(&mut deployments);
        Ok(deployments.len())
    }

    /// Trigger a hosting deployment of a branch
    pub async fn trigger(
        &self,
        branch: Option<String>,
    ) -> Result<DeploymentStatus, ReconcilerError> {
        let outcome = self
            .hosting_action(AdapterAction::TriggerDeployment { git_ref: branch })
            .await?;
        let id = outcome.reference_id.ok_or_else(|| {
            ReconcilerError::ConfigError("hosting did not return a deployment id".to_string())
        })?;

        let status = DeploymentStatus::triggered(id, Platform::Hosting);
        info!("Triggered deployment {}", status.id);
        self.track(status.clone()).await;
        Ok(status)
    }

    /// Roll back to a deployment; the previous ready one when no id is given
    pub async fn rollback(
        &self,
        deployment_id: Option<String>,
    ) -> Result<ActionOutcome, ReconcilerError> {
        let outcome = self
            .hosting_action(AdapterAction::Rollback { deployment_id })
            .await?;
        info!(
            "Rolled back to {}",
            outcome.reference_id.as_deref().unwrap_or("previous deployment")
        );
        Ok(outcome)
    }

    /// Poll the hosting platform and apply observed changes
    pub async fn refresh(&self) -> Result<Vec<DeploymentStatus>, ReconcilerError> {
        let adapter = self.adapters.require(Platform::Hosting)?;
        let snapshot = with_timeout(
            self.adapter_timeout,
            "hosting state read",
            adapter.get_current_state(),
        )
        .await?;

        let PlatformSnapshot::Hosting { deployments: observed, .. } = snapshot else {
            return Err(ReconcilerError::Internal(
                "hosting adapter returned a non-hosting snapshot".to_string(),
            ));
        };

        let mut changed = Vec::new();
        {
            let mut deployments = self.deployments.write().await;
            for status in observed {
                match deployments.iter_mut().find(|d| d.id == status.id) {
                    Some(tracked) => match tracked.apply_update(DeploymentUpdate::from(&status)) {
                        Ok(true) => changed.push(tracked.clone()),
                        Ok(false) => {}
                        Err(e) => warn!("Ignoring poll result: {}", e),
                    },
                    None => {
                        deployments.push(status.clone());
                        changed.push(status);
                    }
                }
            }
            sort_newest_first(&mut deployments);
        }

        debug!("Deployment refresh changed {} record(s)", changed.len());
        for status in &changed {
            record(self.event_log.as_ref(), ENTITY_DEPLOYMENT, status).await;
        }
        Ok(self.list().await)
    }

    /// Tracked deployments, newest first
    pub async fn list(&self) -> Vec<DeploymentStatus> {
        self.deployments.read().await.clone()
    }

    /// Metrics over the most recent deployments
    pub async fn metrics(&self) -> DeploymentMetrics {
        let deployments = self.deployments.read().await;
        compute_metrics(&deployments[..deployments.len().min(METRICS_WINDOW)])
    }

    async fn track(&self, status: DeploymentStatus) {
        {
            let mut deployments = self.deployments.write().await;
            upsert(&mut deployments, status.clone());
            sort_newest_first(&mut deployments);
        }
        record(self.event_log.as_ref(), ENTITY_DEPLOYMENT, &status).await;
    }

    async fn hosting_action(
        &self,
        action: AdapterAction,
    ) -> Result<ActionOutcome, ReconcilerError> {
        let adapter = self.adapters.require(Platform::Hosting)?;
        let what = format!("{} {}", adapter.name(), action.name());
        with_timeout(self.adapter_timeout, &what, adapter.trigger_action(action)).await
    }
}

fn upsert(deployments: &mut Vec<DeploymentStatus>, status: DeploymentStatus) {
    match deployments.iter_mut().find(|d| d.id == status.id) {
        Some(existing) => *existing = status,
        None => deployments.push(status),
    }
}

fn sort_newest_first(deployments: &mut [DeploymentStatus]) {
    deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Metrics of a newest-first deployment list
pub fn compute_metrics(deployments: &[DeploymentStatus]) -> DeploymentMetrics {
    let total = deployments.len();
    if total == 0 {
        return DeploymentMetrics::default();
    }

    let count = |state: DeploymentState| deployments.iter().filter(|d| d.state == state).count();
    let ready = count(DeploymentState::Ready);
    let failed = count(DeploymentState::Error);

    let builds: Vec<i64> = deployments.iter().filter_map(|d| d.build_secs()).collect();
    let average_build_secs = if builds.is_empty() {
        0.0
    } else {
        builds.iter().sum::<i64>() as f64 / builds.len() as f64
    };

    let deployment_frequency = if total < 2 {
        0.0
    } else {
        let newest = deployments[0].created_at;
        let oldest = deployments[total - 1].created_at;
        // Windows shorter than a day count as one day
        let days = ((newest - oldest).num_seconds() as f64 / 86_400.0).max(1.0);
        total as f64 / days
    };

    DeploymentMetrics {
        deployment_frequency,
        success_rate: ready as f64 / total as f64 * 100.0,
        failure_rate: failed as f64 / total as f64 * 100.0,
        average_build_secs,
        last_deployment: Some(deployments[0].created_at),
        total_deployments: total,
    }
}
