//! Phase orchestrator
//!
//! Runs the setup phases strictly in order on a full run, or one phase on
//! request. Each phase: body, scoped drift check, remediation, and a final
//! status taken from the residual issue count. A single in-flight guard
//! rejects a second run while one is executing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::errors::ReconcilerError;
use crate::ledger::ErrorLedger;
use crate::models::platform::Platform;
use crate::models::setup_phase::{
    PhaseId, PhaseStatus, SetupPhase, SetupRunResult, SetupValidation,
};
use crate::models::sync_report::{Issue, IssueKind};
use crate::setup::fsm::{process, PhaseEvent};
use crate::setup::phases::{definition, run_body, verify_resources, PhaseContext};
use crate::storage::event_log::{record, EventLog, ENTITY_SETUP_PHASE, ENTITY_SETUP_RUN};
use crate::storage::settings::SetupSettings;
use crate::sync::aggregator::StatusAggregator;
use crate::sync::remediation::RemediationEngine;

/// Setup phase orchestrator
pub struct SetupOrchestrator {
    aggregator: Arc<StatusAggregator>,
    remediation: Arc<RemediationEngine>,
    ledger: Arc<ErrorLedger>,
    event_log: Arc<dyn EventLog>,
    setup: SetupSettings,
    adapter_timeout: Duration,
    phases: RwLock<Vec<SetupPhase>>,
    run_guard: Mutex<()>,
}

impl SetupOrchestrator {
    pub fn new(
        aggregator: Arc<StatusAggregator>,
        remediation: Arc<RemediationEngine>,
        ledger: Arc<ErrorLedger>,
        event_log: Arc<dyn EventLog>,
        setup: SetupSettings,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            aggregator,
            remediation,
            ledger,
            event_log,
            setup,
            adapter_timeout,
            phases: RwLock::new(pending_phases()),
            run_guard: Mutex::new(()),
        }
    }

    /// Restore the last recorded terminal status of each phase
    pub async fn restore(&self) -> Result<(), ReconcilerError> {
        let rows = self.event_log.read_all(ENTITY_SETUP_PHASE).await?;
        let mut phases = self.phases.write().await;

        for row in rows {
            match serde_json::from_value::<SetupPhase>(row.payload) {
                Ok(phase) if phase.status.is_terminal() => {
                    let index = phase.phase_id.index();
                    phases[index] = phase;
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping malformed setup phase row: {}", e),
            }
        }
        Ok(())
    }

    /// Current record of every phase, in order
    pub async fn get_setup_status(&self) -> Vec<SetupPhase> {
        self.phases.read().await.clone()
    }

    /// Run one phase. The phase number is validated before any adapter is touched.
    pub async fn run_phase(&self, n: i64) -> Result<SetupPhase, ReconcilerError> {
        let id = PhaseId::new(n)?;
        let _guard = self.acquire()?;

        info!("Running setup phase {} ({})", id, definition(id).name);
        Ok(self.execute(id).await)
    }

    /// Run every phase in order; phase k+1 starts only after phase k is terminal
    pub async fn run_complete_setup(&self) -> Result<SetupRunResult, ReconcilerError> {
        let _guard = self.acquire()?;
        info!("Starting complete setup");

        {
            let mut phases = self.phases.write().await;
            *phases = pending_phases();
        }

        let mut results = Vec::new();
        for id in PhaseId::all() {
            results.push(self.execute(id).await);
        }

        let result = SetupRunResult::from_phases(results);
        info!(
            "Complete setup finished: {} completed, {} failed",
            result.summary.completed_count, result.summary.failed_count
        );
        record(self.event_log.as_ref(), ENTITY_SETUP_RUN, &result).await;
        Ok(result)
    }

    /// Read-only check of the current setup
    pub async fn validate_current_setup(&self) -> SetupValidation {
        let adapters = self.aggregator.adapters();
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        for platform in Platform::ALL {
            if adapters.get(platform).is_none() {
                issues.push(format!("{} is not configured", platform));
                recommendations.push(format!(
                    "Add the {} section to the settings file",
                    platform.as_str()
                ));
            }
        }

        let report = self.aggregator.check_all().await;
        for issue in &report.issues {
            issues.push(issue.message.clone());
            recommendations.push(recommendation(issue));
        }

        let identity_ready = report
            .status_by_platform
            .get(&Platform::Identity)
            .is_some_and(|s| s.authenticated);
        let device_ready = report
            .status_by_platform
            .get(&Platform::DeviceMgmt)
            .is_some_and(|s| s.authenticated);
        if identity_ready && device_ready {
            let missing = verify_resources(&self.context()).await;
            if !missing.is_empty() {
                recommendations
                    .push("Run the complete setup to create missing groups and policies".into());
            }
            issues.extend(missing.into_iter().map(|(_, message)| message));
        }

        SetupValidation {
            valid: issues.is_empty(),
            issues,
            recommendations,
        }
    }

    fn acquire(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, ReconcilerError> {
        self.run_guard.try_lock().map_err(|_| {
            ReconcilerError::SetupInProgress("another setup run is still executing".to_string())
        })
    }

    fn context(&self) -> PhaseContext<'_> {
        PhaseContext {
            adapters: self.aggregator.adapters(),
            setup: &self.setup,
            adapter_timeout: self.adapter_timeout,
        }
    }

    async fn execute(&self, id: PhaseId) -> SetupPhase {
        let definition = definition(id);
        let mut phase = self.phases.read().await[id.index()].clone();

        if let Err(e) = process(&mut phase, PhaseEvent::Start) {
            error!("Phase {} could not start: {}", id, e);
        }
        self.store(&phase).await;

        let body = run_body(id, &self.context()).await;
        phase.created = body.created.clone();
        phase.existing = body.existing.clone();
        for (platform, message) in &body.errors {
            self.ledger
                .log_unless_active(*platform, "configuration_error", message)
                .await;
        }

        let report = if definition.scope.len() == Platform::ALL.len() {
            self.aggregator.check_all().await
        } else {
            self.aggregator.check_platforms(definition.scope).await
        };
        let remediation = self.remediation.remediate(&report).await;

        let mut residual = body.error_messages();
        residual.extend(remediation.failed);

        let event = if residual.is_empty() {
            PhaseEvent::Succeed {
                fixed_issues: remediation.fixed,
            }
        } else {
            PhaseEvent::Fail {
                errors: residual,
                fixed_issues: remediation.fixed,
            }
        };
        if let Err(e) = process(&mut phase, event) {
            error!("Phase {} could not finish: {}", id, e);
        }

        match phase.status {
            PhaseStatus::Completed => info!("Phase {} ({}) completed", id, definition.name),
            _ => warn!(
                "Phase {} ({}) failed: {}",
                id,
                definition.name,
                phase.errors.join("; ")
            ),
        }

        self.store(&phase).await;
        phase
    }

    async fn store(&self, phase: &SetupPhase) {
        {
            let mut phases = self.phases.write().await;
            phases[phase.phase_id.index()] = phase.clone();
        }
        record(self.event_log.as_ref(), ENTITY_SETUP_PHASE, phase).await;
    }
}

fn pending_phases() -> Vec<SetupPhase> {
    PhaseId::all()
        .map(|id| SetupPhase::new(id, definition(id).name))
        .collect()
}

fn recommendation(issue: &Issue) -> String {
    match issue.kind {
        IssueKind::NotConnected => format!("Re-authenticate {} credentials", issue.platform),
        IssueKind::Unreachable => format!("Check network access to {}", issue.platform),
        IssueKind::RepositoryUnlinked => {
            "Link the hosting project to its source repository".to_string()
        }
        IssueKind::RevisionMismatch => {
            "Deploy the current source-control head to the hosting platform".to_string()
        }
        IssueKind::StuckDeployment => match &issue.deployment_id {
            Some(id) => format!("Redeploy or cancel deployment {}", id),
            None => "Redeploy the stuck deployment".to_string(),
        },
        IssueKind::StateUnreadable => {
            format!("Check the {} API response format and permissions", issue.platform)
        }
    }
}
