//! In-memory platform adapters

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reconciler::adapters::{
    ActionOutcome, AdapterAction, AdapterSet, PlatformAdapter, PlatformSnapshot, RepositoryLink,
};
use reconciler::errors::ReconcilerError;
use reconciler::models::deployment::DeploymentStatus;
use reconciler::models::platform::{ConnectionStatus, Platform};

/// Scriptable adapter for one platform
pub struct StubAdapter {
    platform: Platform,
    authenticated: AtomicBool,
    fixable: bool,
    unreachable: bool,
    state_unreadable: bool,
    auth_delay: Option<Duration>,
    action_delay: Option<Duration>,
    calls: AtomicUsize,
    branch: String,
    link: RepositoryLink,
    head_revision: String,
    actions: Mutex<Vec<AdapterAction>>,
    groups: Mutex<Vec<String>>,
    policies: Mutex<Vec<String>>,
    deployments: Mutex<Vec<DeploymentStatus>>,
}

impl StubAdapter {
    pub fn connected(platform: Platform) -> Self {
        Self {
            platform,
            authenticated: AtomicBool::new(true),
            fixable: false,
            unreachable: false,
            state_unreadable: false,
            auth_delay: None,
            action_delay: None,
            calls: AtomicUsize::new(0),
            branch: "main".to_string(),
            link: RepositoryLink::Linked("acme/portal".to_string()),
            head_revision: "a1b2c3d4e5f6".to_string(),
            actions: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            policies: Mutex::new(Vec::new()),
            deployments: Mutex::new(Vec::new()),
        }
    }

    /// Reachable but rejecting credentials
    pub fn disconnected(platform: Platform) -> Self {
        let stub = Self::connected(platform);
        stub.authenticated.store(false, Ordering::SeqCst);
        stub
    }

    /// Every call fails with a transport error
    pub fn unreachable(platform: Platform) -> Self {
        Self {
            unreachable: true,
            ..Self::disconnected(platform)
        }
    }

    /// Re-authentication succeeds
    pub fn fixable(mut self) -> Self {
        self.fixable = true;
        self
    }

    /// Authenticated, but state reads fail
    pub fn with_unreadable_state(mut self) -> Self {
        self.state_unreadable = true;
        self
    }

    /// Branch reported by a source-control stub
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    /// Repository link reported by a hosting stub
    pub fn with_link(mut self, link: RepositoryLink) -> Self {
        self.link = link;
        self
    }

    pub fn with_auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = Some(delay);
        self
    }

    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = Some(delay);
        self
    }

    pub fn with_deployments(self, deployments: Vec<DeploymentStatus>) -> Self {
        self.set_deployments(deployments);
        self
    }

    pub fn set_deployments(&self, deployments: Vec<DeploymentStatus>) {
        *self.deployments.lock().unwrap() = deployments;
    }

    /// Actions received so far, in order
    pub fn actions(&self) -> Vec<AdapterAction> {
        self.actions.lock().unwrap().clone()
    }

    /// Number of received actions with the given name
    pub fn action_count(&self, name: &str) -> usize {
        self.actions().iter().filter(|a| a.name() == name).count()
    }

    /// Adapter calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transport_error(&self) -> ReconcilerError {
        ReconcilerError::TransportError(format!("{} connection refused", self.platform))
    }

    fn ensure(list: &Mutex<Vec<String>>, name: &str) -> ActionOutcome {
        let mut list = list.lock().unwrap();
        if list.iter().any(|existing| existing == name) {
            ActionOutcome::existing(name)
        } else {
            list.push(name.to_string());
            ActionOutcome::created(name)
        }
    }
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn name(&self) -> &str {
        "stub"
    }

    async fn check_auth(&self) -> Result<ConnectionStatus, ReconcilerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.auth_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(self.transport_error());
        }

        if self.authenticated.load(Ordering::SeqCst) {
            Ok(ConnectionStatus::connected(self.platform, "stub-user"))
        } else {
            Ok(ConnectionStatus::disconnected(self.platform, "token expired"))
        }
    }

    async fn get_current_state(&self) -> Result<PlatformSnapshot, ReconcilerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(self.transport_error());
        }
        if self.state_unreadable {
            return Err(ReconcilerError::ConfigError(
                "unexpected response shape".to_string(),
            ));
        }

        Ok(match self.platform {
            Platform::SourceControl => PlatformSnapshot::SourceControl {
                repository: "acme/portal".to_string(),
                branch: self.branch.clone(),
                head_revision: self.head_revision.clone(),
            },
            Platform::Hosting => PlatformSnapshot::Hosting {
                project: "portal".to_string(),
                link: self.link.clone(),
                deployments: self.deployments.lock().unwrap().clone(),
            },
            Platform::Identity => PlatformSnapshot::Identity {
                tenant: "Acme".to_string(),
                groups: self.groups.lock().unwrap().clone(),
            },
            Platform::DeviceMgmt => PlatformSnapshot::DeviceMgmt {
                mdm_authority: Some("intune".to_string()),
                policies: self.policies.lock().unwrap().clone(),
                managed_device_count: 0,
            },
        })
    }

    async fn trigger_action(&self, action: AdapterAction) -> Result<ActionOutcome, ReconcilerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.action_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(self.transport_error());
        }
        self.actions.lock().unwrap().push(action.clone());

        Ok(match action {
            AdapterAction::ReAuthenticate => {
                if self.fixable {
                    self.authenticated.store(true, Ordering::SeqCst);
                }
                ActionOutcome::accepted()
            }
            AdapterAction::EnsureGroup { display_name, .. } => {
                Self::ensure(&self.groups, &display_name)
            }
            AdapterAction::EnsureCompliancePolicy(policy) => {
                Self::ensure(&self.policies, &policy.name)
            }
            AdapterAction::TriggerDeployment { .. } => {
                let mut deployments = self.deployments.lock().unwrap();
                let id = format!("dpl_{}", deployments.len() + 1);
                let mut triggered = DeploymentStatus::triggered(id.clone(), self.platform);
                triggered.source_revision = Some(self.head_revision.clone());
                deployments.insert(0, triggered);
                ActionOutcome::created(id)
            }
            _ => ActionOutcome::accepted(),
        })
    }
}

/// Adapter set over shared stubs
pub fn adapter_set(stubs: &[Arc<StubAdapter>]) -> AdapterSet {
    stubs.iter().fold(AdapterSet::new(), |set, stub| {
        set.with(stub.clone() as Arc<dyn PlatformAdapter>)
    })
}

/// One connected stub per platform
pub fn all_connected() -> Vec<Arc<StubAdapter>> {
    Platform::ALL
        .into_iter()
        .map(|p| Arc::new(StubAdapter::connected(p)))
        .collect()
}
