//! Status aggregation across platform adapters

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterSet, PlatformAdapter};
use crate::errors::ReconcilerError;
use crate::ledger::ErrorLedger;
use crate::models::platform::{ConnectionStatus, Platform};
use crate::models::sync_report::{IssueKind, SyncReport};
use crate::storage::event_log::{record, EventLog, ENTITY_SYNC_REPORT};
use crate::sync::detector::{DriftDetector, PlatformObservation};
use crate::utils::with_timeout;

/// Fans status checks out to every configured adapter
pub struct StatusAggregator {
    adapters: AdapterSet,
    detector: DriftDetector,
    ledger: Arc<ErrorLedger>,
    event_log: Arc<dyn EventLog>,
    adapter_timeout: Duration,
    latest: RwLock<Option<SyncReport>>,
}

impl StatusAggregator {
    pub fn new(
        adapters: AdapterSet,
        detector: DriftDetector,
        ledger: Arc<ErrorLedger>,
        event_log: Arc<dyn EventLog>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            detector,
            ledger,
            event_log,
            adapter_timeout,
            latest: RwLock::new(None),
        }
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Check every configured platform. Never fails; adapter failures
    /// degrade to unauthenticated statuses.
    pub async fn check_all(&self) -> SyncReport {
        let report = self.check_platforms(&self.adapters.platforms()).await;

        let mut latest = self.latest.write().await;
        *latest = Some(report.clone());
        report
    }

    /// Check a subset of the configured platforms. Unconfigured platforms are skipped.
    pub async fn check_platforms(&self, platforms: &[Platform]) -> SyncReport {
        let selected: Vec<_> = platforms
            .iter()
            .filter_map(|p| self.adapters.get(*p))
            .collect();
        debug!("Checking {} platform(s)", selected.len());

        let observations = join_all(selected.into_iter().map(|a| self.observe(a.as_ref()))).await;
        let report = self.detector.detect(&observations, Utc::now());

        info!(
            "Sync report: {:?} with {} issue(s)",
            report.overall,
            report.issues.len()
        );
        record(self.event_log.as_ref(), ENTITY_SYNC_REPORT, &report).await;
        report
    }

    /// Most recent full report, if any check has run
    pub async fn latest_report(&self) -> Option<SyncReport> {
        self.latest.read().await.clone()
    }

    async fn observe(&self, adapter: &dyn PlatformAdapter) -> PlatformObservation {
        let platform = adapter.platform();
        let auth = with_timeout(
            self.adapter_timeout,
            &format!("{} auth check", adapter.name()),
            adapter.check_auth(),
        )
        .await;

        let status = match auth {
            Ok(status) => status,
            Err(e) => return self.failed(platform, e).await,
        };

        if !status.authenticated {
            let reason = status.error.as_deref().unwrap_or("not authenticated");
            self.ledger
                .log_unless_active(platform, IssueKind::NotConnected.as_str(), reason)
                .await;
            return PlatformObservation {
                status,
                reachable: true,
                snapshot: None,
                state_error: None,
            };
        }

        let state = with_timeout(
            self.adapter_timeout,
            &format!("{} state read", adapter.name()),
            adapter.get_current_state(),
        )
        .await;

        match state {
            Ok(snapshot) => PlatformObservation {
                status,
                reachable: true,
                snapshot: Some(snapshot),
                state_error: None,
            },
            Err(e @ (ReconcilerError::TransportError(_) | ReconcilerError::HttpError(_))) => {
                self.failed(platform, e).await
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Failed to read {} state: {}", platform, reason);
                self.ledger
                    .log_unless_active(platform, IssueKind::StateUnreadable.as_str(), &reason)
                    .await;
                PlatformObservation {
                    status,
                    reachable: true,
                    snapshot: None,
                    state_error: Some(reason),
                }
            }
        }
    }

    async fn failed(&self, platform: Platform, err: ReconcilerError) -> PlatformObservation {
        let (reachable, kind, reason) = match err {
            ReconcilerError::TransportError(msg) => (false, IssueKind::Unreachable, msg),
            ReconcilerError::HttpError(e) => (false, IssueKind::Unreachable, e.to_string()),
            ReconcilerError::AuthError(msg) => (true, IssueKind::NotConnected, msg),
            other => (true, IssueKind::NotConnected, other.to_string()),
        };

        warn!("{} check failed: {}", platform, reason);
        self.ledger
            .log_unless_active(platform, kind.as_str(), &reason)
            .await;

        PlatformObservation {
            status: ConnectionStatus::disconnected(platform, reason),
            reachable,
            snapshot: None,
            state_error: None,
        }
    }
}
