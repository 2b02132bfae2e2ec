//! Settings file management

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ReconcilerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Reconciler settings
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to daily rolling files under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// External platforms; absent sections are not configured
    #[serde(default)]
    pub platforms: PlatformSettings,

    /// Timeouts and staleness thresholds
    #[serde(default)]
    pub thresholds: ThresholdSettings,

    /// Enterprise setup inputs
    #[serde(default)]
    pub setup: SetupSettings,

    /// Periodic status poller
    #[serde(default)]
    pub poller: PollerSettings,
}

impl Settings {
    /// Load settings from file (defaults when absent) and apply env overrides
    pub async fn load(file: &File) -> Result<Self, ReconcilerError> {
        let mut settings = if file.exists().await {
            info!("Loading settings from {}", file.path().display());
            file.read_json::<Settings>().await?
        } else {
            warn!(
                "Settings file {} not found, using defaults",
                file.path().display()
            );
            Settings::default()
        };

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Fill missing secrets from the environment
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(github) = self.platforms.source_control.as_mut() {
            if github.token.is_none() {
                github.token = lookup("GITHUB_TOKEN").map(SecretString::from);
            }
        }

        if let Some(hosting) = self.platforms.hosting.as_mut() {
            if hosting.token.is_none() {
                hosting.token = lookup("VERCEL_TOKEN").map(SecretString::from);
            }
        }

        for graph in [
            self.platforms.identity.as_mut(),
            self.platforms.device_mgmt.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            if graph.client_secret.is_none() {
                graph.client_secret = lookup("GRAPH_CLIENT_SECRET").map(SecretString::from);
            }
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-platform connection settings
#[derive(Debug, Default, Deserialize)]
pub struct PlatformSettings {
    #[serde(default)]
    pub source_control: Option<GitHubSettings>,

    #[serde(default)]
    pub hosting: Option<HostingSettings>,

    #[serde(default)]
    pub identity: Option<GraphSettings>,

    #[serde(default)]
    pub device_mgmt: Option<GraphSettings>,
}

/// GitHub repository settings
#[derive(Debug, Deserialize)]
pub struct GitHubSettings {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    pub owner: String,

    pub repo: String,

    /// Branch whose head is compared against deployments; repository default when absent
    #[serde(default)]
    pub branch: Option<String>,

    /// Workflow file dispatched by deployment triggers
    #[serde(default = "default_workflow")]
    pub workflow: String,

    #[serde(default)]
    pub token: Option<SecretString>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_workflow() -> String {
    "ci-cd-pipeline.yml".to_string()
}

/// How the hosting platform is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostingMode {
    #[default]
    Api,
    Cli,
}

/// Vercel project settings
#[derive(Debug, Deserialize)]
pub struct HostingSettings {
    #[serde(default)]
    pub mode: HostingMode,

    #[serde(default = "default_vercel_api_url")]
    pub api_url: String,

    /// Project name or id
    pub project: String,

    #[serde(default)]
    pub team_id: Option<String>,

    /// `owner/repo` the project should be linked to
    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default = "default_cli_path")]
    pub cli_path: String,

    #[serde(default)]
    pub token: Option<SecretString>,
}

fn default_vercel_api_url() -> String {
    "https://api.vercel.com".to_string()
}

fn default_cli_path() -> String {
    "vercel".to_string()
}

/// Microsoft Graph tenant settings
#[derive(Debug, Deserialize)]
pub struct GraphSettings {
    pub tenant_id: String,

    pub client_id: String,

    #[serde(default)]
    pub client_secret: Option<SecretString>,

    #[serde(default = "default_graph_url")]
    pub graph_url: String,

    #[serde(default = "default_login_url")]
    pub login_url: String,
}

fn default_graph_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_login_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

/// Timeouts and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSettings {
    /// Per adapter call
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,

    /// A pending/building deployment older than this is stuck
    #[serde(default = "default_stale_build_hours")]
    pub stale_build_hours: u64,

    /// Default age for error purges
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_adapter_timeout() -> u64 {
    10
}

fn default_stale_build_hours() -> u64 {
    24
}

fn default_retention_days() -> u32 {
    30
}

impl ThresholdSettings {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn stale_build(&self) -> Duration {
        Duration::from_secs(self.stale_build_hours * 3600)
    }
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: default_adapter_timeout(),
            stale_build_hours: default_stale_build_hours(),
            retention_days: default_retention_days(),
        }
    }
}

/// Inputs of the enterprise setup phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupSettings {
    #[serde(default = "default_tenant")]
    pub tenant_id: String,

    #[serde(default = "default_carriers")]
    pub carriers: Vec<CarrierSettings>,

    #[serde(default)]
    pub compliance_policy: CompliancePolicySettings,

    #[serde(default)]
    pub branding: BrandingSettings,
}

fn default_tenant() -> String {
    "mdm.esim.com.mm".to_string()
}

fn default_carriers() -> Vec<CarrierSettings> {
    vec![
        CarrierSettings::new("MPT", "414", "01", "Myanmar Posts and Telecommunications"),
        CarrierSettings::new("ATOM", "414", "06", "Atom Myanmar"),
        CarrierSettings::new("MYTEL", "414", "09", "MyTel Myanmar"),
    ]
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            tenant_id: default_tenant(),
            carriers: default_carriers(),
            compliance_policy: CompliancePolicySettings::default(),
            branding: BrandingSettings::default(),
        }
    }
}

/// A mobile carrier that gets its own device group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CarrierSettings {
    pub name: String,
    pub mcc: String,
    pub mnc: String,
    pub display_name: String,
}

impl CarrierSettings {
    pub fn new(name: &str, mcc: &str, mnc: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            mcc: mcc.to_string(),
            mnc: mnc.to_string(),
            display_name: display_name.to_string(),
        }
    }

    /// Security group holding this carrier's devices
    pub fn group_name(&self) -> String {
        format!("Group_{}_eSIM", self.name)
    }

    pub fn group_description(&self) -> String {
        format!("eSIM devices for {}", self.display_name)
    }
}

/// Device compliance policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompliancePolicySettings {
    pub name: String,
    pub description: String,
    pub password_minimum_length: u32,
    pub os_minimum_version: String,
}

impl Default for CompliancePolicySettings {
    fn default() -> Self {
        Self {
            name: "eSIM Enterprise Compliance Policy".to_string(),
            description: "Compliance policy for eSIM enterprise devices".to_string(),
            password_minimum_length: 6,
            os_minimum_version: "10.0.19041".to_string(),
        }
    }
}

/// Company portal branding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrandingSettings {
    pub display_name: String,
    pub contact_it_name: String,
    pub contact_it_email: String,
    pub contact_it_phone: String,
}

impl Default for BrandingSettings {
    fn default() -> Self {
        Self {
            display_name: "eSIM Enterprise Management".to_string(),
            contact_it_name: "IT Support".to_string(),
            contact_it_email: "support@mdm.esim.com.mm".to_string(),
            contact_it_phone: "+95-1-234-5678".to_string(),
        }
    }
}

/// Status poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    300
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_poll_interval(),
        }
    }
}
