//! Deployment tracking and drift tests

use std::sync::Arc;

use chrono::{Duration, Utc};

use reconciler::models::deployment::{DeploymentState, DeploymentStatus};
use reconciler::models::platform::Platform;
use reconciler::models::sync_report::IssueKind;

use crate::harness;
use crate::stubs::StubAdapter;

fn deployment(id: &str, state: DeploymentState, age: Duration) -> DeploymentStatus {
    DeploymentStatus {
        state,
        created_at: Utc::now() - age,
        ..DeploymentStatus::triggered(id, Platform::Hosting)
    }
}

#[tokio::test]
async fn test_terminal_deployment_ignores_later_polls() {
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting).with_deployments(vec![
        deployment("dpl_ready", DeploymentState::Ready, Duration::minutes(5)),
    ]));
    let state = harness(&[hosting.clone()], 5).await;

    let listed = state.tracker.refresh().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, DeploymentState::Ready);

    // A poll that would move a finished deployment backwards
    hosting.set_deployments(vec![deployment(
        "dpl_ready",
        DeploymentState::Building,
        Duration::minutes(5),
    )]);

    let listed = state.tracker.refresh().await.unwrap();
    assert_eq!(listed[0].state, DeploymentState::Ready);
}

#[tokio::test]
async fn test_in_flight_deployment_follows_polls() {
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting));
    let state = harness(&[hosting.clone()], 5).await;

    let triggered = state.tracker.trigger(Some("main".to_string())).await.unwrap();
    assert_eq!(triggered.id, "dpl_1");
    assert_eq!(triggered.state, DeploymentState::Pending);

    let mut finished = deployment("dpl_1", DeploymentState::Ready, Duration::zero());
    finished.created_at = triggered.created_at;
    finished.url = Some("https://portal-dpl1.vercel.app".to_string());
    hosting.set_deployments(vec![finished]);

    let listed = state.tracker.refresh().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, DeploymentState::Ready);
    assert!(listed[0].ready_at.is_some());
    assert_eq!(listed[0].url.as_deref(), Some("https://portal-dpl1.vercel.app"));

    let metrics = state.tracker.metrics().await;
    assert_eq!(metrics.total_deployments, 1);
    assert_eq!(metrics.success_rate, 100.0);
}

#[tokio::test]
async fn test_refresh_without_hosting_is_config_error() {
    let state = harness(&[Arc::new(StubAdapter::connected(Platform::Identity))], 5).await;

    let err = state.tracker.refresh().await.unwrap_err();
    assert!(err.to_string().contains("Hosting is not configured"));
}

#[tokio::test]
async fn test_stuck_build_threshold() {
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting).with_deployments(vec![
        deployment("dpl_recent", DeploymentState::Building, Duration::hours(23)),
    ]));
    let state = harness(&[hosting.clone()], 5).await;

    let report = state.aggregator.check_all().await;
    assert!(report.is_synced(), "{:?}", report.issues);

    hosting.set_deployments(vec![deployment(
        "dpl_old",
        DeploymentState::Building,
        Duration::hours(25),
    )]);

    let report = state.aggregator.check_all().await;
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::StuckDeployment);
    assert_eq!(report.issues[0].deployment_id.as_deref(), Some("dpl_old"));
}
