//! Vercel hosting adapter (CLI)

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, info};

use crate::adapters::cli_output::{
    classify_failure, deployment_id_from_url, extract_deployment_url, parse_deployment_list,
    parse_whoami,
};
use crate::adapters::hosting::{split_repository, supports};
use crate::adapters::{
    auth_outcome, rollback_target, unsupported, ActionOutcome, AdapterAction, PlatformAdapter,
    PlatformSnapshot, RepositoryLink,
};
use crate::errors::ReconcilerError;
use crate::models::platform::{ConnectionStatus, Platform};
use crate::storage::settings::HostingSettings;

/// Hosting adapter driving the `vercel` command line
pub struct VercelCliAdapter {
    cli_path: String,
    project: String,
    team_id: Option<String>,
    repository: Option<String>,
    token: Option<SecretString>,
}

impl VercelCliAdapter {
    pub fn new(settings: &HostingSettings) -> Self {
        Self {
            cli_path: settings.cli_path.clone(),
            project: settings.project.clone(),
            team_id: settings.team_id.clone(),
            repository: settings.repository.clone(),
            token: settings
                .token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_owned())),
        }
    }

    /// Run one CLI command and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String, ReconcilerError> {
        let command = args.first().copied().unwrap_or_default();
        debug!("Running {} {}", self.cli_path, args.join(" "));

        let output = self
            .command(args)
            .output().await.map_err(|e| {
            ReconcilerError::TransportError(format!("Failed to run {}: {}", self.cli_path, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(command, &stderr))
    }

    /// The token travels in the environment so it never shows up in process listings
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.cli_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(token) = &self.token {
            cmd.env("VERCEL_TOKEN", token.expose_secret());
        }
        if let Some(team) = &self.team_id {
            cmd.arg("--scope").arg(team);
        }
        cmd
    }

    async fn username(&self) -> Result<String, ReconcilerError> {
        let stdout = self.run(&["whoami"]).await?;
        parse_whoami(&stdout).ok_or_else(|| {
            ReconcilerError::AuthError("vercel whoami printed no username".to_string())
        })
    }
}

#[async_trait]
impl PlatformAdapter for VercelCliAdapter {
    fn platform(&self) -> Platform {
        Platform::Hosting
    }

    fn name(&self) -> &str {
        "vercel-cli"
    }

    async fn check_auth(&self) -> Result<ConnectionStatus, ReconcilerError> {
        auth_outcome(self.platform(), self.username().await)
    }

    async fn get_current_state(&self) -> Result<PlatformSnapshot, ReconcilerError> {
        let stdout = self.run(&["ls", &self.project]).await?;
        let deployments = parse_deployment_list(&stdout, Utc::now());

        // `vercel ls` does not show the git link
        Ok(PlatformSnapshot::Hosting {
            project: self.project.clone(),
            link: RepositoryLink::Unknown,
            deployments,
        })
    }

    async fn trigger_action(
        &self,
        action: AdapterAction,
    ) -> Result<ActionOutcome, ReconcilerError> {
        if !supports(&action) {
            return Err(unsupported(self.name(), &action));
        }

        match action {
            AdapterAction::ReAuthenticate => {
                let username = self.username().await?;
                Ok(ActionOutcome::existing(username))
            }
            AdapterAction::LinkRepository => {
                let repository = self.repository.as_deref().ok_or_else(|| {
                    ReconcilerError::ConfigError(
                        "no repository configured for hosting project".to_string(),
                    )
                })?;
                let (owner, repo) = split_repository(repository)?;
                let remote = format!("https://github.com/{}/{}", owner, repo);

                info!("Linking project {} to {}", self.project, remote);
                self.run(&["link", "--yes", "--project", &self.project])
                    .await?;
                self.run(&["git", "connect", &remote, "--yes"]).await?;
                Ok(ActionOutcome::accepted())
            }
            AdapterAction::TriggerDeployment { git_ref } => {
                // The CLI deploys the checked-out working tree
                info!(
                    "Deploying working tree to production (requested ref: {})",
                    git_ref.as_deref().unwrap_or("default")
                );
                let stdout = self.run(&["deploy", "--prod", "--yes"]).await?;
                deployment_outcome(&stdout)
            }
            AdapterAction::Redeploy { deployment_id } => {
                info!("Redeploying {}", deployment_id);
                let stdout = self.run(&["redeploy", &deployment_id]).await?;
                deployment_outcome(&stdout)
            }
            AdapterAction::Rollback { deployment_id } => {
                let target = match deployment_id {
                    Some(id) => id,
                    None => {
                        let stdout = self.run(&["ls", &self.project]).await?;
                        let deployments = parse_deployment_list(&stdout, Utc::now());
                        rollback_target(&deployments)
                            .map(|d| d.id.clone())
                            .ok_or_else(|| {
                                ReconcilerError::NotFound(
                                    "no earlier ready deployment to roll back to".to_string(),
                                )
                            })?
                    }
                };

                info!("Rolling back {} to {}", self.project, target);
                self.run(&["rollback", &target, "--yes"]).await?;
                Ok(ActionOutcome::existing(target))
            }
            other => Err(unsupported(self.name(), &other)),
        }
    }
}

fn deployment_outcome(stdout: &str) -> Result<ActionOutcome, ReconcilerError> {
    let url = extract_deployment_url(stdout).ok_or_else(|| {
        ReconcilerError::ConfigError("vercel did not print a deployment URL".to_string())
    })?;
    Ok(ActionOutcome::created(deployment_id_from_url(&url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(cli_path: &str) -> VercelCliAdapter {
        let settings: HostingSettings = serde_json::from_value(serde_json::json!({
            "project": "portal",
            "mode": "cli",
            "cli_path": cli_path,
        }))
        .unwrap();
        VercelCliAdapter::new(&settings)
    }

    #[test]
    fn test_token_passed_through_environment() {
        let settings: HostingSettings = serde_json::from_value(serde_json::json!({
            "project": "portal",
            "mode": "cli",
            "team_id": "team_acme",
            "token": "vc_secret_123",
        }))
        .unwrap();
        let cmd = VercelCliAdapter::new(&settings).command(&["ls", "portal"]);
        let std_cmd = cmd.as_std();

        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["ls", "portal", "--scope", "team_acme"]);
        assert!(!args.iter().any(|a| a.contains("vc_secret_123")));

        let token = std_cmd
            .get_envs()
            .find(|(key, _)| *key == "VERCEL_TOKEN")
            .and_then(|(_, value)| value);
        assert_eq!(token.and_then(|v| v.to_str()), Some("vc_secret_123"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport_error() {
        let err = adapter("/nonexistent/vercel-binary")
            .check_auth()
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::TransportError(_)));
    }

    #[tokio::test]
    async fn test_unsupported_action_rejected_before_running() {
        let err = adapter("/nonexistent/vercel-binary")
            .trigger_action(AdapterAction::EnsureGroup {
                display_name: "g".into(),
                description: "d".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::ConfigError(_)));
    }

    #[test]
    fn test_deployment_outcome() {
        let outcome = deployment_outcome("✅  Production: https://portal-1-acme.vercel.app [3s]").unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.reference_id.as_deref(), Some("portal-1-acme.vercel.app"));
    }
}
