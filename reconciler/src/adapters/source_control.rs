//! GitHub source-control adapter

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::adapters::{
    auth_outcome, unsupported, ActionOutcome, AdapterAction, PlatformAdapter, PlatformSnapshot,
};
use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;
use crate::models::platform::{ConnectionStatus, Platform};
use crate::storage::settings::GitHubSettings;

/// Source-control adapter backed by the GitHub REST API
pub struct GitHubAdapter {
    http_client: Arc<HttpClient>,
    owner: String,
    repo: String,
    branch: Option<String>,
    workflow: String,
    token: Option<SecretString>,
}

impl GitHubAdapter {
    pub fn new(http_client: Arc<HttpClient>, settings: &GitHubSettings) -> Self {
        Self {
            http_client,
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
            workflow: settings.workflow.clone(),
            token: settings
                .token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_owned())),
        }
    }

    fn token(&self) -> Result<&str, ReconcilerError> {
        self.token
            .as_ref()
            .map(|t| t.expose_secret())
            .ok_or_else(|| ReconcilerError::AuthError("no GitHub token configured".to_string()))
    }

    async fn branch(&self, token: &str) -> Result<String, ReconcilerError> {
        match &self.branch {
            Some(branch) => Ok(branch.clone()),
            None => {
                let repo = self
                    .http_client
                    .github_repo(&self.owner, &self.repo, token)
                    .await?;
                Ok(repo.default_branch)
            }
        }
    }

    async fn login(&self) -> Result<String, ReconcilerError> {
        let user = self.http_client.github_user(self.token()?).await?;
        Ok(user.login)
    }
}

#[async_trait]
impl PlatformAdapter for GitHubAdapter {
    fn platform(&self) -> Platform {
        Platform::SourceControl
    }

    fn name(&self) -> &str {
        "github"
    }

    async fn check_auth(&self) -> Result<ConnectionStatus, ReconcilerError> {
        auth_outcome(self.platform(), self.login().await)
    }

    async fn get_current_state(&self) -> Result<PlatformSnapshot, ReconcilerError> {
        let token = self.token()?;
        let branch = self.branch(token).await?;
        let head = self
            .http_client
            .github_head_commit(&self.owner, &self.repo, &branch, token)
            .await?;

        debug!(
            "Head of {}/{}@{} is {} ({})",
            self.owner,
            self.repo,
            branch,
            head.sha,
            head.commit.message.lines().next().unwrap_or_default()
        );

        Ok(PlatformSnapshot::SourceControl {
            repository: format!("{}/{}", self.owner, self.repo),
            branch,
            head_revision: head.sha,
        })
    }

    async fn trigger_action(
        &self,
        action: AdapterAction,
    ) -> Result<ActionOutcome, ReconcilerError> {
        match action {
            AdapterAction::ReAuthenticate => {
                let login = self.login().await?;
                Ok(ActionOutcome::existing(login))
            }
            AdapterAction::TriggerDeployment { git_ref } => {
                let token = self.token()?;
                let git_ref = match git_ref {
                    Some(r) => r,
                    None => self.branch(token).await?,
                };
                info!(
                    "Dispatching workflow {} on {}/{}@{}",
                    self.workflow, self.owner, self.repo, git_ref
                );
                self.http_client
                    .github_dispatch_workflow(&self.owner, &self.repo, &self.workflow, &git_ref, token)
                    .await?;
                Ok(ActionOutcome::accepted())
            }
            other => Err(unsupported(self.name(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn adapter(token: Option<&str>) -> GitHubAdapter {
        let settings: GitHubSettings = serde_json::from_value(serde_json::json!({
            "owner": "acme",
            "repo": "portal",
            "token": token,
        }))
        .unwrap();
        let client = Arc::new(HttpClient::new(&settings.api_url, Duration::from_secs(1)).unwrap());
        GitHubAdapter::new(client, &settings)
    }

    #[tokio::test]
    async fn test_missing_token_reports_disconnected() {
        let status = adapter(None).check_auth().await.unwrap();
        assert!(!status.authenticated);
        assert_eq!(status.error.as_deref(), Some("no GitHub token configured"));
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let err = adapter(Some("t"))
            .trigger_action(AdapterAction::LinkRepository)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::ConfigError(_)));
    }
}
