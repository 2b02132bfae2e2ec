//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use api_models::{
    ApiResponse, FixResponse, HealthResponse, PurgeRequest, PurgeResponse, RollbackRequest,
    TriggerRequest, ValidateRequest, VersionResponse,
};

use crate::adapters::ActionOutcome;
use crate::deploy::validation::{
    parse_site_url, validate_deployment, CheckStatus, DeploymentValidation, DEFAULT_PROBES,
};
use crate::errors::ReconcilerError;
use crate::models::deployment::DeploymentStatus;
use crate::models::deployment_error::{ActiveErrorView, DeploymentError};
use crate::models::platform::Platform;
use crate::models::setup_phase::{PhaseStatus, SetupPhase, SetupRunResult};
use crate::server::state::ServerState;
use crate::utils::version_info;

type HandlerResult<T> = Result<Json<ApiResponse<T>>, ReconcilerError>;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        service: "reconciler".to_string(),
        version: version.version,
    }))
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(ApiResponse::ok(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    }))
}

/// Fresh cross-platform sync report
pub async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let report = state.aggregator.check_all().await;
    Json(ApiResponse::ok(report))
}

/// Check every platform and remediate what was found
pub async fn fix_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let report = state.aggregator.check_all().await;
    let result = state.remediation.remediate(&report).await;

    let message = format!(
        "Fixed {} issue(s), {} failed",
        result.fixed.len(),
        result.failed.len()
    );
    Json(ApiResponse::with_outcome(
        result.is_clean(),
        FixResponse::from(result),
        message,
    ))
}

/// Current record of every setup phase
pub async fn setup_status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.orchestrator.get_setup_status().await))
}

/// Run all setup phases in order
pub async fn run_setup_handler(
    State(state): State<Arc<ServerState>>,
) -> HandlerResult<SetupRunResult> {
    let result = state.orchestrator.run_complete_setup().await?;
    let message = format!(
        "{} phase(s) completed, {} failed",
        result.summary.completed_count, result.summary.failed_count
    );
    Ok(Json(ApiResponse::with_outcome(result.success, result, message)))
}

/// Run one setup phase
pub async fn run_phase_handler(
    State(state): State<Arc<ServerState>>,
    Path(n): Path<i64>,
) -> HandlerResult<SetupPhase> {
    let phase = state.orchestrator.run_phase(n).await?;
    let success = phase.status == PhaseStatus::Completed;
    let message = format!("Phase {} ({}) {:?}", n, phase.name, phase.status).to_lowercase();
    Ok(Json(ApiResponse::with_outcome(success, phase, message)))
}

/// Read-only validation of the current setup
pub async fn validate_setup_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let validation = state.orchestrator.validate_current_setup().await;
    let message = format!("{} issue(s) found", validation.issues.len());
    Json(ApiResponse::with_outcome(validation.valid, validation, message))
}

/// Active error filter
#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    pub platform: Option<Platform>,
}

/// Active error listing
#[derive(Debug, Serialize)]
pub struct ErrorsResponse {
    pub errors: Vec<ActiveErrorView>,
    pub count: usize,
}

/// Active ledger errors, newest first
pub async fn errors_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ErrorsQuery>,
) -> impl IntoResponse {
    let latest = state.aggregator.latest_report().await;
    let errors: Vec<_> = state
        .ledger
        .get_active_views(latest.as_ref())
        .await
        .into_iter()
        .filter(|view| query.platform.is_none_or(|p| view.error.platform == p))
        .collect();
    let count = state.ledger.error_count(query.platform).await;

    Json(ApiResponse::ok(ErrorsResponse { errors, count }))
}

/// Mark an active error resolved
pub async fn resolve_error_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> HandlerResult<DeploymentError> {
    let error = state.ledger.resolve_error(&id).await?;
    Ok(Json(ApiResponse::ok(error)))
}

/// Mark an active error ignored
pub async fn ignore_error_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> HandlerResult<DeploymentError> {
    let error = state.ledger.ignore_error(&id).await?;
    Ok(Json(ApiResponse::ok(error)))
}

/// Delete resolved and ignored errors older than `days` and compact the event log
pub async fn purge_errors_handler(
    State(state): State<Arc<ServerState>>,
    Query(request): Query<PurgeRequest>,
) -> impl IntoResponse {
    let days = request.days.unwrap_or(state.retention_days);
    let cutoff = Utc::now() - Duration::days(i64::from(days));
    let deleted = state.ledger.purge_older_than(cutoff).await;
    let compacted = match state.event_log.compact(cutoff).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!("Event log compaction failed: {}", e);
            0
        }
    };

    info!("Purged {} error(s) older than {} day(s)", deleted, days);
    Json(ApiResponse::ok(PurgeResponse { deleted, compacted }))
}

/// Refresh and list tracked deployments
pub async fn deployments_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.tracker.refresh().await {
        Ok(deployments) => Json(ApiResponse::ok(deployments)),
        Err(e) => {
            warn!("Deployment refresh failed: {}", e);
            Json(ApiResponse::with_outcome(
                false,
                state.tracker.list().await,
                format!("Showing cached deployments: {}", e),
            ))
        }
    }
}

/// Trigger a hosting deployment
pub async fn trigger_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<TriggerRequest>,
) -> HandlerResult<DeploymentStatus> {
    let deployment = state.tracker.trigger(request.branch).await?;
    Ok(Json(ApiResponse::ok(deployment)))
}

/// Roll the hosting project back
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RollbackRequest>,
) -> HandlerResult<ActionOutcome> {
    let outcome = state.tracker.rollback(request.deployment_id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// CI/CD metrics over recent deployments
pub async fn deployment_metrics_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(state.tracker.metrics().await))
}

/// Probe a deployed site
pub async fn validate_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ValidateRequest>,
) -> HandlerResult<DeploymentValidation> {
    let site = parse_site_url(&request.url)?;
    let validation = validate_deployment(&state.probe_client, &site, &DEFAULT_PROBES).await;

    let passed = validation
        .checks
        .iter()
        .filter(|c| c.status == CheckStatus::Pass)
        .count();
    let message = format!("{}/{} checks passed", passed, validation.checks.len());
    Ok(Json(ApiResponse::with_outcome(validation.healthy, validation, message)))
}
