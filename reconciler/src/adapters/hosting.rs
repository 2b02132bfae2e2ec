//! Vercel hosting adapter (REST API)

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::adapters::{
    auth_outcome, rollback_target, unsupported, ActionOutcome, AdapterAction, PlatformAdapter,
    PlatformSnapshot, RepositoryLink,
};
use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;
use crate::http::vercel::{CreateDeployment, GitSource, VercelDeployment};
use crate::models::platform::{ConnectionStatus, Platform};
use crate::storage::settings::HostingSettings;

/// Deployments fetched per state read
const DEPLOYMENT_PAGE: u32 = 20;

/// Hosting adapter backed by the Vercel REST API
pub struct VercelAdapter {
    http_client: Arc<HttpClient>,
    project: String,
    team_id: Option<String>,
    repository: Option<String>,
    token: Option<SecretString>,
}

impl VercelAdapter {
    pub fn new(http_client: Arc<HttpClient>, settings: &HostingSettings) -> Self {
        Self {
            http_client,
            project: settings.project.clone(),
            team_id: settings.team_id.clone(),
            repository: settings.repository.clone(),
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
            .ok_or_else(|| ReconcilerError::AuthError("no Vercel token configured".to_string()))
    }

    fn repository(&self) -> Result<(&str, &str), ReconcilerError> {
        let repository = self.repository.as_deref().ok_or_else(|| {
            ReconcilerError::ConfigError("no repository configured for hosting project".into())
        })?;
        split_repository(repository)
    }

    async fn username(&self) -> Result<String, ReconcilerError> {
        let response = self.http_client.vercel_user(self.token()?).await?;
        Ok(response.user.username)
    }

    async fn deployments(&self, token: &str) -> Result<Vec<VercelDeployment>, ReconcilerError> {
        let project = self
            .http_client
            .vercel_project(&self.project, self.team_id.as_deref(), token)
            .await?;
        self.http_client
            .vercel_deployments(&project.id, self.team_id.as_deref(), DEPLOYMENT_PAGE, token)
            .await
    }
}

#[async_trait]
impl PlatformAdapter for VercelAdapter {
    fn platform(&self) -> Platform {
        Platform::Hosting
    }

    fn name(&self) -> &str {
        "vercel"
    }

    async fn check_auth(&self) -> Result<ConnectionStatus, ReconcilerError> {
        auth_outcome(self.platform(), self.username().await)
    }

    async fn get_current_state(&self) -> Result<PlatformSnapshot, ReconcilerError> {
        let token = self.token()?;
        let project = self
            .http_client
            .vercel_project(&self.project, self.team_id.as_deref(), token)
            .await?;
        let deployments = self
            .http_client
            .vercel_deployments(&project.id, self.team_id.as_deref(), DEPLOYMENT_PAGE, token)
            .await?;

        let link = match project.link.as_ref().and_then(|l| l.full_name()) {
            Some(repository) => RepositoryLink::Linked(repository),
            None => RepositoryLink::Unlinked,
        };

        let mut deployments: Vec<_> = deployments.iter().map(|d| d.to_status()).collect();
        deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(PlatformSnapshot::Hosting {
            project: project.name,
            link,
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
        let token = self.token()?;
        let team_id = self.team_id.as_deref();

        match action {
            AdapterAction::ReAuthenticate => {
                let username = self.username().await?;
                Ok(ActionOutcome::existing(username))
            }
            AdapterAction::LinkRepository => {
                let (org, repo) = self.repository()?;
                let full_name = format!("{}/{}", org, repo);
                let project = self
                    .http_client
                    .vercel_project(&self.project, team_id, token)
                    .await?;

                if project.link.as_ref().and_then(|l| l.full_name()).as_deref() == Some(&full_name) {
                    return Ok(ActionOutcome::existing(project.id));
                }

                info!("Linking project {} to {}", self.project, full_name);
                self.http_client
                    .vercel_link_repository(&project.id, &full_name, team_id, token)
                    .await?;
                Ok(ActionOutcome::created(project.id))
            }
            AdapterAction::TriggerDeployment { git_ref } => {
                let (org, repo) = self.repository()?;
                let git_ref = git_ref.unwrap_or_else(|| "main".to_string());
                info!("Triggering production deployment of {} from {}", self.project, git_ref);

                let request = CreateDeployment {
                    name: &self.project,
                    target: "production",
                    deployment_id: None,
                    git_source: Some(GitSource {
                        kind: "github",
                        org,
                        repo,
                        git_ref: &git_ref,
                    }),
                };
                let created = self
                    .http_client
                    .vercel_create_deployment(&request, team_id, token)
                    .await?;
                Ok(ActionOutcome::created(created.id))
            }
            AdapterAction::Redeploy { deployment_id } => {
                info!("Redeploying {}", deployment_id);
                let request = CreateDeployment {
                    name: &self.project,
                    target: "production",
                    deployment_id: Some(&deployment_id),
                    git_source: None,
                };
                let created = self
                    .http_client
                    .vercel_create_deployment(&request, team_id, token)
                    .await?;
                Ok(ActionOutcome::created(created.id))
            }
            AdapterAction::Rollback { deployment_id } => {
                let project = self
                    .http_client
                    .vercel_project(&self.project, team_id, token)
                    .await?;
                let target = match deployment_id {
                    Some(id) => id,
                    None => {
                        let deployments: Vec<_> = self
                            .deployments(token)
                            .await?
                            .iter()
                            .map(|d| d.to_status())
                            .collect();
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
                self.http_client
                    .vercel_rollback(&project.id, &target, team_id, token)
                    .await?;
                Ok(ActionOutcome::existing(target))
            }
            other => Err(unsupported(self.name(), &other)),
        }
    }
}

/// Actions a hosting adapter implements
pub fn supports(action: &AdapterAction) -> bool {
    matches!(
        action,
        AdapterAction::ReAuthenticate
            | AdapterAction::LinkRepository
            | AdapterAction::TriggerDeployment { .. }
            | AdapterAction::Redeploy { .. }
            | AdapterAction::Rollback { .. }
    )
}

/// Split `owner/repo`
pub fn split_repository(repository: &str) -> Result<(&str, &str), ReconcilerError> {
    match repository.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(ReconcilerError::ConfigError(format!(
            "repository {} is not of the form owner/repo",
            repository
        ))),
    }
}
