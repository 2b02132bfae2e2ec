//! Post-deploy validation of a deployed site

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;

/// One path probed on the deployed site
#[derive(Debug, Clone)]
pub struct Probe {
    pub name: &'static str,
    pub path: &'static str,
    pub timeout: Duration,
}

/// Health endpoint first, then the status APIs
pub const DEFAULT_PROBES: [Probe; 3] = [
    Probe {
        name: "Health Check",
        path: "/api/v1/system/health",
        timeout: Duration::from_secs(10),
    },
    Probe {
        name: "API /api/v1/system/status",
        path: "/api/v1/system/status",
        timeout: Duration::from_secs(5),
    },
    Probe {
        name: "API /api/v1/enterprise/status",
        path: "/api/v1/enterprise/status",
        timeout: Duration::from_secs(5),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationCheck {
    fn from_status(name: &str, status: StatusCode) -> Self {
        Self {
            name: name.to_string(),
            status: if status.is_success() {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            },
            status_code: Some(status.as_u16()),
            error: None,
        }
    }

    fn failed(name: &str, error: &ReconcilerError) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            status_code: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentValidation {
    pub healthy: bool,
    pub checks: Vec<ValidationCheck>,
}

impl DeploymentValidation {
    pub fn from_checks(checks: Vec<ValidationCheck>) -> Self {
        Self {
            healthy: checks.iter().all(|c| c.status == CheckStatus::Pass),
            checks,
        }
    }
}

/// Parse and check a caller-supplied site URL
pub fn parse_site_url(raw: &str) -> Result<Url, ReconcilerError> {
    let url = Url::parse(raw)
        .map_err(|e| ReconcilerError::ValidationError(format!("Invalid URL {}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ReconcilerError::ValidationError(format!(
            "URL {} must use http or https",
            raw
        )));
    }
    Ok(url)
}

/// Probe every path of a deployed site; probes never abort the batch
pub async fn validate_deployment(
    client: &HttpClient,
    site: &Url,
    probes: &[Probe],
) -> DeploymentValidation {
    let base = site.as_str().trim_end_matches('/');
    let mut checks = Vec::with_capacity(probes.len());

    for probe in probes {
        let target = format!("{}{}", base, probe.path);
        let check = match client.probe(&target, probe.timeout).await {
            Ok(status) => ValidationCheck::from_status(probe.name, status),
            Err(e) => {
                warn!("Probe {} failed: {}", target, e);
                ValidationCheck::failed(probe.name, &e)
            }
        };
        checks.push(check);
    }

    let validation = DeploymentValidation::from_checks(checks);
    info!("Validated {}: healthy={}", base, validation.healthy);
    validation
}
