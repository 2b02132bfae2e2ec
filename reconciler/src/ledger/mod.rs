//! Deployment error ledger
//!
//! Records platform errors for operator review. Records change only through
//! resolve/ignore and disappear only through the age-based purge. Every
//! mutation is written to the event log so the ledger can be replayed on start.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::ReconcilerError;
use crate::models::deployment_error::{ActiveErrorView, DeploymentError, ErrorStatus};
use crate::models::platform::Platform;
use crate::models::sync_report::SyncReport;
use crate::storage::event_log::{record, EventLog, ENTITY_DEPLOYMENT_ERROR};
use crate::utils::generate_uuid;

/// Persisted ledger mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LedgerEvent {
    Upsert { error: DeploymentError },
    Purged { ids: Vec<String> },
}

/// Deployment error ledger
pub struct ErrorLedger {
    errors: Mutex<Vec<DeploymentError>>,
    event_log: Arc<dyn EventLog>,
}

impl ErrorLedger {
    /// Create an empty ledger
    pub fn new(event_log: Arc<dyn EventLog>) -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
            event_log,
        }
    }

    /// Rebuild the ledger from its event log rows
    pub async fn load(event_log: Arc<dyn EventLog>) -> Result<Self, ReconcilerError> {
        let rows = event_log.read_all(ENTITY_DEPLOYMENT_ERROR).await?;
        let mut errors: Vec<DeploymentError> = Vec::new();

        for row in rows {
            match serde_json::from_value::<LedgerEvent>(row.payload) {
                Ok(LedgerEvent::Upsert { error }) => {
                    match errors.iter_mut().find(|e| e.id == error.id) {
                        Some(existing) => *existing = error,
                        None => errors.push(error),
                    }
                }
                Ok(LedgerEvent::Purged { ids }) => errors.retain(|e| !ids.contains(&e.id)),
                Err(e) => warn!("Skipping malformed ledger row: {}", e),
            }
        }

        info!("Loaded {} deployment errors from event log", errors.len());
        Ok(Self {
            errors: Mutex::new(errors),
            event_log,
        })
    }

    /// Append a new active error
    pub async fn log_error(
        &self,
        platform: Platform,
        error_type: &str,
        message: &str,
    ) -> DeploymentError {
        let mut errors = self.errors.lock().await;
        self.push(&mut errors, platform, error_type, message).await
    }

    /// Append an active error unless one with the same platform and type is already active
    pub async fn log_unless_active(
        &self,
        platform: Platform,
        error_type: &str,
        message: &str,
    ) -> Option<DeploymentError> {
        let mut errors = self.errors.lock().await;
        let duplicate = errors.iter().any(|e| {
            e.status == ErrorStatus::Active && e.platform == platform && e.error_type == error_type
        });
        if duplicate {
            return None;
        }
        Some(self.push(&mut errors, platform, error_type, message).await)
    }

    async fn push(
        &self,
        errors: &mut Vec<DeploymentError>,
        platform: Platform,
        error_type: &str,
        message: &str,
    ) -> DeploymentError {
        let error = DeploymentError {
            id: generate_uuid(),
            platform,
            error_type: error_type.to_string(),
            message: message.to_string(),
            status: ErrorStatus::Active,
            created_at: Utc::now(),
            resolved_at: None,
        };

        errors.push(error.clone());
        self.persist(&error).await;

        warn!("Logged {} error for {}: {}", error_type, platform, message);
        error
    }

    /// Mark an error resolved
    pub async fn resolve_error(&self, id: &str) -> Result<DeploymentError, ReconcilerError> {
        self.set_status(id, ErrorStatus::Resolved).await
    }

    /// Mark an error ignored
    pub async fn ignore_error(&self, id: &str) -> Result<DeploymentError, ReconcilerError> {
        self.set_status(id, ErrorStatus::Ignored).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: ErrorStatus,
    ) -> Result<DeploymentError, ReconcilerError> {
        let mut errors = self.errors.lock().await;
        let error = errors
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ReconcilerError::NotFound(format!("Deployment error {}", id)))?;

        // Only active errors change; repeating the call is a no-op
        if error.status != ErrorStatus::Active {
            return Ok(error.clone());
        }

        error.status = status;
        error.resolved_at = Some(Utc::now());
        let updated = error.clone();
        self.persist(&updated).await;

        info!("Deployment error {} is now {:?}", id, status);
        Ok(updated)
    }

    /// Active errors, newest first
    pub async fn get_active_errors(&self) -> Vec<DeploymentError> {
        let errors = self.errors.lock().await;
        let mut active: Vec<_> = errors
            .iter()
            .rev()
            .filter(|e| e.status == ErrorStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    /// Active errors flagged stale against the most recent sync report
    pub async fn get_active_views(&self, latest: Option<&SyncReport>) -> Vec<ActiveErrorView> {
        self.get_active_errors()
            .await
            .into_iter()
            .map(|error| {
                let stale = latest
                    .map(|report| report.issues_for(error.platform).next().is_none())
                    .unwrap_or(false);
                ActiveErrorView { error, stale }
            })
            .collect()
    }

    /// Number of active errors, optionally for one platform
    pub async fn error_count(&self, platform: Option<Platform>) -> usize {
        let errors = self.errors.lock().await;
        errors
            .iter()
            .filter(|e| e.status == ErrorStatus::Active)
            .filter(|e| platform.is_none_or(|p| e.platform == p))
            .count()
    }

    /// Resolve every active error of a platform with the given type
    pub async fn resolve_matching(&self, platform: Platform, error_type: &str) -> usize {
        let mut errors = self.errors.lock().await;
        let now = Utc::now();
        let mut resolved = Vec::new();

        for error in errors.iter_mut().filter(|e| {
            e.status == ErrorStatus::Active && e.platform == platform && e.error_type == error_type
        }) {
            error.status = ErrorStatus::Resolved;
            error.resolved_at = Some(now);
            resolved.push(error.clone());
        }

        for error in &resolved {
            self.persist(error).await;
        }
        if !resolved.is_empty() {
            info!(
                "Resolved {} {} errors for {}",
                resolved.len(),
                error_type,
                platform
            );
        }
        resolved.len()
    }

    /// Delete resolved and ignored errors created before the cutoff.
    /// Active errors are never purged.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut errors = self.errors.lock().await;
        let ids: Vec<String> = errors
            .iter()
            .filter(|e| e.status != ErrorStatus::Active && e.created_at < cutoff)
            .map(|e| e.id.clone())
            .collect();

        if ids.is_empty() {
            return 0;
        }

        errors.retain(|e| !ids.contains(&e.id));
        record(
            self.event_log.as_ref(),
            ENTITY_DEPLOYMENT_ERROR,
            &LedgerEvent::Purged { ids: ids.clone() },
        )
        .await;

        info!("Purged {} deployment errors older than {}", ids.len(), cutoff);
        ids.len()
    }

    async fn persist(&self, error: &DeploymentError) {
        record(
            self.event_log.as_ref(),
            ENTITY_DEPLOYMENT_ERROR,
            &LedgerEvent::Upsert {
                error: error.clone(),
            },
        )
        .await;
    }
}
