//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::ReconcilerError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::settings::Settings;
use crate::workers::poller;

/// Run the reconciler until the shutdown signal fires
pub async fn run(
    version: String,
    settings: Settings,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ReconcilerError> {
    info!("Initializing reconciler {}...", version);

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&settings, &options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start reconciler: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    settings: &Settings,
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, ReconcilerError> {
    let app_state = Arc::new(AppState::init(settings, &options.storage.layout).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    if options.enable_socket_server {
        init_socket_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    if options.enable_poller {
        init_poller_worker(
            options.poller.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(app_state)
}

fn init_poller_worker(
    options: poller::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ReconcilerError> {
    info!("Initializing poller worker (every {:?})...", options.interval);

    let aggregator = app_state.aggregator.clone();

    let poller_handle = tokio::spawn(async move {
        poller::run(
            &options,
            aggregator.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ReconcilerError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::from_app_state(app_state.as_ref());

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    socket_server_handle: Option<JoinHandle<Result<(), ReconcilerError>>>,
    poller_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            socket_server_handle: None,
            poller_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), ReconcilerError> {
        if self.app_state.is_some() {
            return Err(ReconcilerError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), ReconcilerError> {
        if self.poller_worker_handle.is_some() {
            return Err(ReconcilerError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ReconcilerError>>,
    ) -> Result<(), ReconcilerError> {
        if self.socket_server_handle.is_some() {
            return Err(ReconcilerError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ReconcilerError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ReconcilerError> {
        info!("Shutting down reconciler...");

        // 1. Poller worker
        if let Some(handle) = self.poller_worker_handle.take() {
            handle
                .await
                .map_err(|e| ReconcilerError::ShutdownError(e.to_string()))?;
        }

        // 2. Socket server; in-flight requests finish first
        if let Some(handle) = self.socket_server_handle.take() {
            handle
                .await
                .map_err(|e| ReconcilerError::ShutdownError(e.to_string()))??;
        }

        // 3. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
