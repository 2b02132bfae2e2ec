//! Server state

use std::sync::Arc;

use crate::app::state::AppState;
use crate::deploy::tracker::DeploymentTracker;
use crate::http::client::HttpClient;
use crate::ledger::ErrorLedger;
use crate::setup::orchestrator::SetupOrchestrator;
use crate::storage::event_log::EventLog;
use crate::sync::aggregator::StatusAggregator;
use crate::sync::remediation::RemediationEngine;

/// Server state shared across handlers
pub struct ServerState {
    pub aggregator: Arc<StatusAggregator>,
    pub remediation: Arc<RemediationEngine>,
    pub orchestrator: Arc<SetupOrchestrator>,
    pub ledger: Arc<ErrorLedger>,
    pub tracker: Arc<DeploymentTracker>,
    pub probe_client: Arc<HttpClient>,
    pub event_log: Arc<dyn EventLog>,
    pub retention_days: u32,
}

impl ServerState {
    pub fn from_app_state(app_state: &AppState) -> Self {
        Self {
            aggregator: app_state.aggregator.clone(),
            remediation: app_state.remediation.clone(),
            orchestrator: app_state.orchestrator.clone(),
            ledger: app_state.ledger.clone(),
            tracker: app_state.tracker.clone(),
            probe_client: app_state.probe_client.clone(),
            event_log: app_state.event_log.clone(),
            retention_days: app_state.retention_days,
        }
    }
}
