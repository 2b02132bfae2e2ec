//! Error ledger tests against live checks

use std::sync::Arc;

use chrono::{Duration, Utc};

use reconciler::models::deployment_error::ErrorStatus;
use reconciler::models::platform::Platform;

use crate::harness;
use crate::stubs::StubAdapter;

#[tokio::test]
async fn test_repeated_checks_keep_one_active_error() {
    let identity = Arc::new(StubAdapter::disconnected(Platform::Identity));
    let state = harness(&[identity], 5).await;

    state.aggregator.check_all().await;
    state.aggregator.check_all().await;
    state.aggregator.check_all().await;

    let active = state.ledger.get_active_errors().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].platform, Platform::Identity);
    assert_eq!(active[0].error_type, "not_connected");
}

#[tokio::test]
async fn test_errors_without_current_issue_are_stale() {
    let identity = Arc::new(StubAdapter::disconnected(Platform::Identity));
    let hosting = Arc::new(StubAdapter::connected(Platform::Hosting));
    let state = harness(&[identity, hosting], 5).await;

    state
        .ledger
        .log_error(Platform::Hosting, "revision_mismatch", "Latest deployment is behind")
        .await;

    // No report yet: nothing can be called stale
    let views = state.ledger.get_active_views(None).await;
    assert!(views.iter().all(|v| !v.stale));

    let report = state.aggregator.check_all().await;
    let views = state.ledger.get_active_views(Some(&report)).await;
    assert_eq!(views.len(), 2);

    let hosting_view = views
        .iter()
        .find(|v| v.error.platform == Platform::Hosting)
        .unwrap();
    let identity_view = views
        .iter()
        .find(|v| v.error.platform == Platform::Identity)
        .unwrap();
    assert!(hosting_view.stale);
    assert!(!identity_view.stale);
}

#[tokio::test]
async fn test_successful_remediation_resolves_matching_errors() {
    let identity = Arc::new(StubAdapter::disconnected(Platform::Identity).fixable());
    let state = harness(&[identity], 5).await;

    let report = state.aggregator.check_all().await;
    assert_eq!(state.ledger.error_count(Some(Platform::Identity)).await, 1);

    let result = state.remediation.remediate(&report).await;
    assert_eq!(result.fixed.len(), 1);
    assert_eq!(state.ledger.error_count(None).await, 0);
}

#[tokio::test]
async fn test_purge_keeps_active_errors() {
    let state = harness(&[], 5).await;

    let active = state
        .ledger
        .log_error(Platform::Hosting, "unreachable", "Hosting unreachable")
        .await;
    let resolved = state
        .ledger
        .log_error(Platform::Hosting, "not_connected", "Hosting not connected")
        .await;
    let resolved = state.ledger.resolve_error(&resolved.id).await.unwrap();
    assert_eq!(resolved.status, ErrorStatus::Resolved);

    let deleted = state
        .ledger
        .purge_older_than(Utc::now() + Duration::seconds(1))
        .await;

    assert_eq!(deleted, 1);
    let remaining = state.ledger.get_active_errors().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, active.id);
}
