//! Status aggregation and remediation tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use reconciler::adapters::{AdapterAction, AdapterSet, RepositoryLink};
use reconciler::errors::ReconcilerError;
use reconciler::models::deployment::{DeploymentState, DeploymentStatus};
use reconciler::models::platform::Platform;
use reconciler::models::sync_report::{Issue, IssueKind, Overall};
use reconciler::sync::remediation::RemediationAction;

use crate::harness;
use crate::stubs::StubAdapter;

#[tokio::test]
async fn test_one_platform_not_connected_then_reauthenticated() {
    let a = Arc::new(StubAdapter::connected(Platform::Identity));
    let b = Arc::new(StubAdapter::disconnected(Platform::DeviceMgmt).fixable());
    let state = harness(&[a, b], 5).await;

    let report = state.aggregator.check_all().await;
    assert_eq!(report.overall, Overall::Errored);
    assert_eq!(report.issue_messages(), vec!["Device management not connected"]);
    assert!(report.status_by_platform[&Platform::Identity].authenticated);
    assert!(!report.status_by_platform[&Platform::DeviceMgmt].authenticated);

    let result = state.remediation.remediate(&report).await;
    assert_eq!(result.fixed, vec!["Device management re-authenticated"]);
    assert!(result.failed.is_empty());

    // Fixes are not re-verified; an explicit check confirms them
    let report = state.aggregator.check_all().await;
    assert_eq!(report.overall, Overall::Synced);
}

#[tokio::test]
async fn test_transport_error_makes_report_errored() {
    let source = Arc::new(StubAdapter::connected(Platform::SourceControl));
    let hosting = Arc::new(StubAdapter::unreachable(Platform::Hosting));
    let state = harness(&[source, hosting], 5).await;

    let report = state.aggregator.check_all().await;

    assert_eq!(report.overall, Overall::Errored);
    let status = &report.status_by_platform[&Platform::Hosting];
    assert!(!status.authenticated);
    assert!(status.error.as_deref().unwrap().contains("connection refused"));
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::Unreachable);
}

#[tokio::test(start_paused = true)]
async fn test_check_all_never_fails_on_hanging_adapters() {
    let stubs: Vec<_> = Platform::ALL
        .into_iter()
        .map(|p| Arc::new(StubAdapter::connected(p).with_auth_delay(Duration::from_secs(600))))
        .collect();
    let state = harness(&stubs, 2).await;

    let started = Instant::now();
    let report = state.aggregator.check_all().await;

    // Checks fan out, so the whole report is bounded by one timeout
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.overall, Overall::Errored);
    assert_eq!(report.status_by_platform.len(), 4);
    assert!(report
        .status_by_platform
        .values()
        .all(|s| !s.authenticated && s.error.as_deref().unwrap().contains("timed out")));
}

#[tokio::test]
async fn test_all_connected_is_synced() {
    let stubs: Vec<_> = Platform::ALL
        .into_iter()
        .map(|p| Arc::new(StubAdapter::connected(p)))
        .collect();
    let state = harness(&stubs, 5).await;

    let report = state.aggregator.check_all().await;

    assert!(report.is_synced());
    assert!(report.issues.is_empty());
    assert!(state.aggregator.latest_report().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_remediation_attempts_once_within_timeout() {
    let identity = Arc::new(
        StubAdapter::disconnected(Platform::Identity).with_action_delay(Duration::from_secs(600)),
    );
    let device = Arc::new(
        StubAdapter::disconnected(Platform::DeviceMgmt).with_action_delay(Duration::from_secs(600)),
    );
    let state = harness(&[identity.clone(), device.clone()], 2).await;

    let issues = vec![
        Issue::new(Platform::Identity, IssueKind::NotConnected, "Identity not connected"),
        Issue::new(Platform::DeviceMgmt, IssueKind::NotConnected, "Device management not connected"),
    ];

    let started = Instant::now();
    let result = state.remediation.remediate_issues(&issues).await;

    assert!(started.elapsed() <= Duration::from_secs(2 * issues.len() as u64));
    assert!(result.fixed.is_empty());
    assert_eq!(result.failed.len(), 2);
    assert!(result.failed[0].starts_with("Identity not connected: "));
    assert!(result.failed[0].contains("timed out"));
    assert_eq!(identity.calls(), 1);
    assert_eq!(device.calls(), 1);
}

#[tokio::test]
async fn test_failed_remediation_is_logged_and_batch_continues() {
    let hosting = Arc::new(StubAdapter::unreachable(Platform::Hosting));
    let identity = Arc::new(StubAdapter::disconnected(Platform::Identity).fixable());
    let state = harness(&[hosting, identity], 5).await;

    let issues = vec![
        Issue::new(
            Platform::Hosting,
            IssueKind::RepositoryUnlinked,
            "Hosting project portal is not linked to a repository",
        ),
        Issue::new(Platform::Identity, IssueKind::NotConnected, "Identity not connected"),
    ];

    let result = state.remediation.remediate_issues(&issues).await;

    assert_eq!(result.fixed, vec!["Identity re-authenticated"]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(state.ledger.error_count(Some(Platform::Hosting)).await, 1);
}

struct AlwaysFixed;

#[async_trait]
impl RemediationAction for AlwaysFixed {
    fn name(&self) -> &str {
        "always_fixed"
    }

    async fn apply(&self, issue: &Issue, _adapters: &AdapterSet) -> Result<String, ReconcilerError> {
        Ok(format!("{} re-authenticated", issue.platform))
    }
}

#[tokio::test]
async fn test_registered_action_override() {
    use reconciler::sync::remediation::RemediationEngine;
    use reconciler::ledger::ErrorLedger;
    use reconciler::storage::event_log::MemoryEventLog;

    let event_log = Arc::new(MemoryEventLog::new());
    let engine = RemediationEngine::new(
        AdapterSet::new(),
        Arc::new(ErrorLedger::new(event_log.clone())),
        event_log,
        Duration::from_secs(1),
    )
    .with_action(IssueKind::NotConnected, Arc::new(AlwaysFixed));

    let issue = Issue::new(Platform::Hosting, IssueKind::NotConnected, "Hosting not connected");
    let result = engine.remediate_issues(&[issue.clone(), issue]).await;

    // Duplicate issues are attempted once
    assert_eq!(result.fixed, vec!["Hosting re-authenticated"]);
    assert!(result.failed.is_empty());
}

#[tokio::test]
async fn test_unreadable_state_is_reported() {
    let source = Arc::new(StubAdapter::connected(Platform::SourceControl));
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting).with_unreadable_state());
    let state = harness(&[source, hosting], 5).await;

    let report = state.aggregator.check_all().await;

    assert_eq!(report.overall, Overall::Drifted);
    assert!(report.status_by_platform[&Platform::Hosting].authenticated);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::StateUnreadable);
    assert!(report.issues[0].message.starts_with("Hosting state unreadable: "));

    let views = state.ledger.get_active_views(Some(&report)).await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].error.error_type, "state_unreadable");
    assert!(!views[0].stale);
}

fn hosted(id: &str, state: DeploymentState, age_hours: i64, revision: &str) -> DeploymentStatus {
    let mut deployment = DeploymentStatus::triggered(id, Platform::Hosting);
    deployment.state = state;
    deployment.created_at = Utc::now() - chrono::Duration::hours(age_hours);
    deployment.source_revision = Some(revision.to_string());
    deployment
}

#[tokio::test]
async fn test_revision_fix_deploys_tracked_branch_once() {
    let source = Arc::new(StubAdapter::connected(Platform::SourceControl).with_branch("release"));
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting).with_deployments(vec![
        hosted("dpl_old", DeploymentState::Ready, 2, "0f0f0f0f0f0f"),
    ]));
    let state = harness(&[source, hosting.clone()], 5).await;

    let report = state.aggregator.check_all().await;
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::RevisionMismatch);

    let first = state.remediation.remediate(&report).await;
    assert_eq!(first.fixed, vec!["Hosting deployment dpl_2 triggered from release"]);
    assert_eq!(
        hosting.actions(),
        vec![AdapterAction::TriggerDeployment {
            git_ref: Some("release".to_string())
        }]
    );

    // Replaying the same report finds the head already deploying
    let second = state.remediation.remediate(&report).await;
    assert!(second.failed.is_empty());
    assert_eq!(second.fixed, vec!["Hosting deployment dpl_2 already at a1b2c3d"]);
    assert_eq!(hosting.action_count("trigger_deployment"), 1);

    assert!(state.aggregator.check_all().await.is_synced());
}

#[tokio::test]
async fn test_revision_fix_refuses_foreign_repository() {
    let source = Arc::new(StubAdapter::connected(Platform::SourceControl));
    let hosting = Arc::new(
        StubAdapter::connected(Platform::Hosting)
            .with_link(RepositoryLink::Linked("acme/legacy-portal".to_string()))
            .with_deployments(vec![hosted("dpl_old", DeploymentState::Ready, 2, "0f0f0f0f0f0f")]),
    );
    let state = harness(&[source, hosting.clone()], 5).await;

    let report = state.aggregator.check_all().await;
    let result = state.remediation.remediate(&report).await;

    assert!(result.fixed.is_empty());
    assert_eq!(result.failed.len(), 1);
    assert!(result.failed[0].contains(
        "Drift error: hosting project deploys acme/legacy-portal but source control tracks acme/portal"
    ));
    assert!(hosting.actions().is_empty());
    assert_eq!(state.ledger.error_count(Some(Platform::Hosting)).await, 1);
}

#[tokio::test]
async fn test_redeploy_skips_deployment_that_finished() {
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting).with_deployments(vec![
        hosted("dpl_stuck", DeploymentState::Building, 30, "a1b2c3d4e5f6"),
    ]));
    let state = harness(&[hosting.clone()], 5).await;

    let report = state.aggregator.check_all().await;
    assert_eq!(report.issues[0].kind, IssueKind::StuckDeployment);

    let first = state.remediation.remediate(&report).await;
    assert_eq!(first.fixed, vec!["Deployment dpl_stuck redeployed"]);
    assert_eq!(hosting.action_count("redeploy"), 1);

    hosting.set_deployments(vec![hosted("dpl_stuck", DeploymentState::Ready, 30, "a1b2c3d4e5f6")]);

    let second = state.remediation.remediate(&report).await;
    assert_eq!(second.fixed, vec!["Deployment dpl_stuck is no longer in flight"]);
    assert_eq!(hosting.action_count("redeploy"), 1);
}
