//! Application state management

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::adapters::device_mgmt::GraphDeviceMgmtAdapter;
use crate::adapters::hosting::VercelAdapter;
use crate::adapters::hosting_cli::VercelCliAdapter;
use crate::adapters::identity::GraphIdentityAdapter;
use crate::adapters::source_control::GitHubAdapter;
use crate::adapters::{AdapterSet, PlatformAdapter};
use crate::authn::graph_token::{GraphTokenManager, MissingCredentials, TokenManagerExt};
use crate::deploy::tracker::DeploymentTracker;
use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;
use crate::ledger::ErrorLedger;
use crate::storage::event_log::{EventLog, JsonlEventLog};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{
    GraphSettings, HostingMode, PlatformSettings, Settings, SetupSettings, ThresholdSettings,
};
use crate::setup::orchestrator::SetupOrchestrator;
use crate::sync::aggregator::StatusAggregator;
use crate::sync::detector::DriftDetector;
use crate::sync::remediation::RemediationEngine;

/// Main application state
pub struct AppState {
    /// Append-only audit log
    pub event_log: Arc<dyn EventLog>,

    /// Deployment error ledger
    pub ledger: Arc<ErrorLedger>,

    /// Cross-platform status checks
    pub aggregator: Arc<StatusAggregator>,

    /// Issue remediation
    pub remediation: Arc<RemediationEngine>,

    /// Setup phases
    pub orchestrator: Arc<SetupOrchestrator>,

    /// Hosting deployments
    pub tracker: Arc<DeploymentTracker>,

    /// Unauthenticated client for post-deploy probes
    pub probe_client: Arc<HttpClient>,

    /// Default age of purged ledger entries
    pub retention_days: u32,
}

impl AppState {
    /// Initialize application state from settings
    pub async fn init(settings: &Settings, layout: &StorageLayout) -> Result<Self, ReconcilerError> {
        info!("Initializing application state...");

        layout.setup().await?;
        let event_log: Arc<dyn EventLog> = Arc::new(JsonlEventLog::new(layout.event_log_file()));
        let retention = chrono::Duration::days(i64::from(settings.thresholds.retention_days));
        if let Err(e) = event_log.compact(Utc::now() - retention).await {
            warn!("Event log compaction failed: {}", e);
        }

        let adapters = build_adapters(&settings.platforms, settings.thresholds.adapter_timeout())?;
        if adapters.is_empty() {
            warn!("No platforms configured");
        } else {
            info!("Configured platforms: {:?}", adapters.platforms());
        }

        Self::assemble(
            adapters,
            event_log,
            &settings.thresholds,
            settings.setup.clone(),
        )
        .await
    }

    /// Wire the components around a set of adapters and replay persisted state
    pub async fn assemble(
        adapters: AdapterSet,
        event_log: Arc<dyn EventLog>,
        thresholds: &ThresholdSettings,
        setup: SetupSettings,
    ) -> Result<Self, ReconcilerError> {
        let timeout = thresholds.adapter_timeout();

        let ledger = Arc::new(ErrorLedger::load(event_log.clone()).await?);

        let aggregator = Arc::new(StatusAggregator::new(
            adapters.clone(),
            DriftDetector::new(thresholds.stale_build()),
            ledger.clone(),
            event_log.clone(),
            timeout,
        ));

        let remediation = Arc::new(RemediationEngine::new(
            adapters.clone(),
            ledger.clone(),
            event_log.clone(),
            timeout,
        ));

        let orchestrator = Arc::new(SetupOrchestrator::new(
            aggregator.clone(),
            remediation.clone(),
            ledger.clone(),
            event_log.clone(),
            setup,
            timeout,
        ));
        orchestrator.restore().await?;

        let tracker = Arc::new(DeploymentTracker::new(adapters, event_log.clone(), timeout));
        let tracked = tracker.load().await?;
        info!("Restored {} tracked deployment(s)", tracked);

        let probe_client = Arc::new(HttpClient::new("", timeout)?);

        Ok(Self {
            event_log,
            ledger,
            aggregator,
            remediation,
            orchestrator,
            tracker,
            probe_client,
            retention_days: thresholds.retention_days,
        })
    }

    /// Release state before exit. Every mutation is already in the event log.
    pub async fn shutdown(&self) -> Result<(), ReconcilerError> {
        info!(
            "Shutting down application state with {} active error(s)...",
            self.ledger.error_count(None).await
        );
        Ok(())
    }
}

/// Build one adapter per configured platform section
pub fn build_adapters(
    platforms: &PlatformSettings,
    timeout: Duration,
) -> Result<AdapterSet, ReconcilerError> {
    let mut adapters = AdapterSet::new();

    if let Some(github) = &platforms.source_control {
        let client = Arc::new(HttpClient::new(&github.api_url, timeout)?);
        adapters = adapters.with(Arc::new(GitHubAdapter::new(client, github)));
    }

    if let Some(hosting) = &platforms.hosting {
        let adapter: Arc<dyn PlatformAdapter> = match hosting.mode {
            HostingMode::Api => {
                let client = Arc::new(HttpClient::new(&hosting.api_url, timeout)?);
                Arc::new(VercelAdapter::new(client, hosting))
            }
            HostingMode::Cli => Arc::new(VercelCliAdapter::new(hosting)),
        };
        adapters = adapters.with(adapter);
    }

    if let Some(graph) = &platforms.identity {
        let (client, tokens) = graph_client(graph, timeout)?;
        adapters = adapters.with(Arc::new(GraphIdentityAdapter::new(client, tokens)));
    }

    if let Some(graph) = &platforms.device_mgmt {
        let (client, tokens) = graph_client(graph, timeout)?;
        adapters = adapters.with(Arc::new(GraphDeviceMgmtAdapter::new(client, tokens)));
    }

    Ok(adapters)
}

fn graph_client(
    settings: &GraphSettings,
    timeout: Duration,
) -> Result<(Arc<HttpClient>, Arc<dyn TokenManagerExt>), ReconcilerError> {
    let client = Arc::new(HttpClient::new(&settings.graph_url, timeout)?);

    let tokens: Arc<dyn TokenManagerExt> = match &settings.client_secret {
        Some(secret) => Arc::new(GraphTokenManager::new(
            client.clone(),
            &settings.login_url,
            &settings.tenant_id,
            &settings.client_id,
            SecretString::from(secret.expose_secret().to_owned()),
        )),
        None => {
            warn!(
                "No Graph client secret for tenant {}, platform will report not connected",
                settings.tenant_id
            );
            Arc::new(MissingCredentials::new(&settings.tenant_id))
        }
    };

    Ok((client, tokens))
}
