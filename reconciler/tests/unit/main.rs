//! Integration tests against in-memory platform adapters

mod stubs;
mod test_deployments;
mod test_ledger;
mod test_server;
mod test_setup;
mod test_sync;

use std::sync::Arc;

use reconciler::app::state::AppState;
use reconciler::storage::event_log::MemoryEventLog;
use reconciler::storage::settings::{SetupSettings, ThresholdSettings};

use crate::stubs::{adapter_set, StubAdapter};

/// Fully wired state over the given stubs with a per-call timeout in seconds
pub async fn harness(stubs: &[Arc<StubAdapter>], adapter_timeout_secs: u64) -> AppState {
    let thresholds = ThresholdSettings {
        adapter_timeout_secs,
        ..Default::default()
    };

    AppState::assemble(
        adapter_set(stubs),
        Arc::new(MemoryEventLog::new()),
        &thresholds,
        SetupSettings::default(),
    )
    .await
    .unwrap()
}
