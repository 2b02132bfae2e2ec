//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ReconcilerError;
use crate::models::platform::Platform;

/// Deployment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Pending,
    Building,
    Ready,
    Error,
    Canceled,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::Building => "building",
            DeploymentState::Ready => "ready",
            DeploymentState::Error => "error",
            DeploymentState::Canceled => "canceled",
        }
    }

    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Ready | DeploymentState::Error | DeploymentState::Canceled
        )
    }

    /// Still waiting on the hosting platform
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DeploymentState::Pending | DeploymentState::Building)
    }
}

/// A deployment on a hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub id: String,
    pub platform: Platform,
    pub state: DeploymentState,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,

    /// Commit the deployment was built from, when the platform reports it
    #[serde(default)]
    pub source_revision: Option<String>,
}

/// Observed values from a status poll of the same platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentUpdate {
    pub state: DeploymentState,
    pub url: Option<String>,
    pub ready_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&DeploymentStatus> for DeploymentUpdate {
    fn from(status: &DeploymentStatus) -> Self {
        Self {
            state: status.state,
            url: status.url.clone(),
            ready_at: status.ready_at,
            error_message: status.error_message.clone(),
        }
    }
}

impl DeploymentStatus {
    /// New deployment record created by a trigger action
    pub fn triggered(id: impl Into<String>, platform: Platform) -> Self {
        Self {
            id: id.into(),
            platform,
            state: DeploymentState::Pending,
            url: None,
            created_at: Utc::now(),
            ready_at: None,
            error_message: None,
            source_revision: None,
        }
    }

    /// Whether an update carries information this record does not have yet.
    /// Fields the poll left empty carry no information.
    pub fn differs_from(&self, update: &DeploymentUpdate) -> bool {
        fn differs<T: PartialEq>(current: &Option<T>, observed: &Option<T>) -> bool {
            observed.is_some() && observed != current
        }

        self.state != update.state
            || differs(&self.url, &update.url)
            || differs(&self.ready_at, &update.ready_at)
            || differs(&self.error_message, &update.error_message)
    }

    /// Apply a poll result.
    ///
    /// Returns `Ok(true)` when the record changed. Terminal records reject any
    /// update that would alter them.
    pub fn apply_update(&mut self, update: DeploymentUpdate) -> Result<bool, ReconcilerError> {
        if !self.differs_from(&update) {
            return Ok(false);
        }

        if self.state.is_terminal() {
            return Err(ReconcilerError::ValidationError(format!(
                "Deployment {} is {:?} and can no longer change",
                self.id, self.state
            )));
        }

        self.state = update.state;
        if update.url.is_some() {
            self.url = update.url;
        }
        if update.ready_at.is_some() {
            self.ready_at = update.ready_at;
        } else if self.state == DeploymentState::Ready && self.ready_at.is_none() {
            self.ready_at = Some(Utc::now());
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message;
        }

        Ok(true)
    }

    /// Build duration in seconds, when the deployment finished
    pub fn build_secs(&self) -> Option<i64> {
        self.ready_at
            .map(|ready| (ready - self.created_at).num_seconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(state: DeploymentState) -> DeploymentUpdate {
        DeploymentUpdate {
            state,
            url: None,
            ready_at: None,
            error_message: None,
        }
    }

    #[test]
    fn test_poll_advances_in_flight_deployment() {
        let mut deployment = DeploymentStatus::triggered("dpl_1", Platform::Hosting);

        assert!(deployment.apply_update(update(DeploymentState::Building)).unwrap());
        assert_eq!(deployment.state, DeploymentState::Building);

        assert!(deployment.apply_update(update(DeploymentState::Ready)).unwrap());
        assert_eq!(deployment.state, DeploymentState::Ready);
        assert!(deployment.ready_at.is_some());
    }

    #[test]
    fn test_terminal_deployment_is_immutable() {
        let mut deployment = DeploymentStatus::triggered("dpl_1", Platform::Hosting);
        deployment.apply_update(update(DeploymentState::Error)).unwrap();

        let before = deployment.clone();
        let result = deployment.apply_update(update(DeploymentState::Ready));

        assert!(result.is_err());
        assert_eq!(deployment, before);
    }

    #[test]
    fn test_identical_poll_is_noop_on_terminal() {
        let mut deployment = DeploymentStatus::triggered("dpl_1", Platform::Hosting);
        deployment.apply_update(update(DeploymentState::Canceled)).unwrap();

        let same = DeploymentUpdate::from(&deployment);
        assert!(!deployment.apply_update(same).unwrap());
    }
}
