//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ReconcilerError;
use crate::server::handlers::{
    deployment_metrics_handler, deployments_handler, errors_handler, fix_handler,
    health_handler, ignore_error_handler, purge_errors_handler, resolve_error_handler,
    rollback_handler, run_phase_handler, run_setup_handler, setup_status_handler,
    status_handler, trigger_deployment_handler, validate_deployment_handler,
    validate_setup_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Cross-platform status
        .route("/status", get(status_handler))
        .route("/sync/fix", post(fix_handler))
        // Setup
        .route("/setup/status", get(setup_status_handler))
        .route("/setup/run", post(run_setup_handler))
        .route("/setup/phase/{n}", post(run_phase_handler))
        .route("/setup/validate", get(validate_setup_handler))
        // Error ledger
        .route("/errors", get(errors_handler))
        .route("/errors/purge", post(purge_errors_handler))
        .route("/errors/{id}/resolve", post(resolve_error_handler))
        .route("/errors/{id}/ignore", post(ignore_error_handler))
        // Deployments
        .route("/deployments", get(deployments_handler))
        .route("/deployments/trigger", post(trigger_deployment_handler))
        .route("/deployments/rollback", post(rollback_handler))
        .route("/deployments/metrics", get(deployment_metrics_handler))
        .route("/deployments/validate", post(validate_deployment_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ReconcilerError>>, ReconcilerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ReconcilerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ReconcilerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
