//! Setup orchestration tests

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use reconciler::errors::ReconcilerError;
use reconciler::models::platform::Platform;
use reconciler::models::setup_phase::PhaseStatus;

use crate::harness;
use crate::stubs::{all_connected, StubAdapter};

#[tokio::test]
async fn test_out_of_range_phase_touches_no_adapter() {
    let stubs = all_connected();
    let state = harness(&stubs, 5).await;

    for n in [0, 8, -1] {
        let err = assert_err!(state.orchestrator.run_phase(n).await);
        assert!(matches!(err, ReconcilerError::ValidationError(_)));
    }

    assert!(stubs.iter().all(|s| s.calls() == 0));
    let phases = state.orchestrator.get_setup_status().await;
    assert!(phases.iter().all(|p| p.status == PhaseStatus::Pending));
}

#[tokio::test]
async fn test_phase_body_is_idempotent() {
    let stubs = all_connected();
    let state = harness(&stubs, 5).await;

    let first = assert_ok!(state.orchestrator.run_phase(3).await);
    assert_eq!(first.status, PhaseStatus::Completed);
    assert_eq!(first.created.len(), 3);
    assert!(first.existing.is_empty());

    let second = assert_ok!(state.orchestrator.run_phase(3).await);
    assert_eq!(second.status, PhaseStatus::Completed);
    assert!(second.created.is_empty());
    assert_eq!(second.existing.len(), 3);
    assert!(second.fixed_issues.is_empty());
}

#[tokio::test]
async fn test_complete_setup_runs_phases_in_order() {
    let stubs = all_connected();
    let state = harness(&stubs, 5).await;

    let result = assert_ok!(state.orchestrator.run_complete_setup().await);

    assert!(result.success, "{:?}", result.phases);
    assert_eq!(result.summary.completed_count, 7);
    assert_eq!(result.summary.failed_count, 0);

    let ids: Vec<u8> = result.phases.iter().map(|p| p.phase_id.get()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);

    for pair in result.phases.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert!(prev.started_at.unwrap() <= next.started_at.unwrap());
        assert!(prev.ended_at.unwrap() <= next.started_at.unwrap());
    }

    let status = state.orchestrator.get_setup_status().await;
    assert!(status.iter().all(|p| p.status == PhaseStatus::Completed));
}

#[tokio::test]
async fn test_unconfigured_platform_fails_its_phases() {
    let identity = Arc::new(StubAdapter::connected(Platform::Identity));
    let state = harness(&[identity], 5).await;

    let result = state.orchestrator.run_complete_setup().await.unwrap();

    assert!(!result.success);
    let device_phase = &result.phases[1];
    assert_eq!(device_phase.status, PhaseStatus::Failed);
    assert_eq!(device_phase.errors, vec!["Device management is not configured"]);

    // Identity-only phases still complete
    assert_eq!(result.phases[0].status, PhaseStatus::Completed);
    assert_eq!(result.phases[2].status, PhaseStatus::Completed);
    assert!(state.ledger.error_count(Some(Platform::DeviceMgmt)).await >= 1);
}

#[tokio::test]
async fn test_failed_phase_can_be_rerun() {
    let identity = Arc::new(StubAdapter::disconnected(Platform::Identity));
    let state = harness(&[identity], 5).await;

    let failed = state.orchestrator.run_phase(1).await.unwrap();
    assert_eq!(failed.status, PhaseStatus::Failed);
    assert_eq!(failed.errors.len(), 1);
    assert!(failed.errors[0].starts_with("Identity not connected"));

    let rerun = state.orchestrator.run_phase(1).await.unwrap();
    assert_eq!(rerun.status, PhaseStatus::Failed);
    assert!(rerun.started_at >= failed.started_at);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_setup_is_rejected() {
    let stubs: Vec<_> = Platform::ALL
        .into_iter()
        .map(|p| Arc::new(StubAdapter::connected(p).with_auth_delay(Duration::from_secs(5))))
        .collect();
    let state = harness(&stubs, 10).await;

    let orchestrator = state.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.run_complete_setup().await });

    // Let the first run take the guard and park on its adapter calls
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = assert_err!(state.orchestrator.run_phase(1).await);
    assert!(matches!(err, ReconcilerError::SetupInProgress(_)));
    let err = assert_err!(state.orchestrator.run_complete_setup().await);
    assert!(matches!(err, ReconcilerError::SetupInProgress(_)));

    let result = first.await.unwrap().unwrap();
    assert_eq!(result.summary.completed_count, 7);
}

#[tokio::test]
async fn test_validate_current_setup_reports_missing_resources() {
    let stubs = all_connected();
    let state = harness(&stubs, 5).await;

    let before = state.orchestrator.validate_current_setup().await;
    assert!(!before.valid);
    assert!(before
        .issues
        .iter()
        .any(|i| i == "Group Group_MPT_eSIM not found"));

    state.orchestrator.run_complete_setup().await.unwrap();

    let after = state.orchestrator.validate_current_setup().await;
    assert!(after.valid, "{:?}", after.issues);
    assert!(after.issues.is_empty());
}
