//! Vercel REST API client

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;
use crate::http::encode_query;
use crate::models::deployment::{DeploymentState, DeploymentStatus};
use crate::models::platform::Platform;

/// Authenticated user
#[derive(Debug, Clone, Deserialize)]
pub struct VercelUserResponse {
    pub user: VercelUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VercelUser {
    pub username: String,
}

/// Project with its git link
#[derive(Debug, Clone, Deserialize)]
pub struct VercelProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub link: Option<VercelProjectLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VercelProjectLink {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
}

impl VercelProjectLink {
    /// `org/repo` when both parts are known
    pub fn full_name(&self) -> Option<String> {
        match (&self.org, &self.repo) {
            (Some(org), Some(repo)) => Some(format!("{}/{}", org, repo)),
            (None, Some(repo)) => Some(repo.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VercelDeploymentsResponse {
    pub deployments: Vec<VercelDeployment>,
}

/// Deployment as listed by `GET /v6/deployments`.
///
/// List items carry both the legacy `state`/`created` keys and their
/// `readyState`/`createdAt` counterparts, so each is its own field.
#[derive(Debug, Clone, Deserialize)]
pub struct VercelDeployment {
    pub uid: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "readyState")]
    pub ready_state: Option<String>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub ready: Option<i64>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
}

impl VercelDeployment {
    /// Normalize into the canonical deployment record
    pub fn to_status(&self) -> DeploymentStatus {
        let state = self.ready_state.as_deref().or(self.state.as_deref());
        let created = self.created_at.or(self.created);

        DeploymentStatus {
            id: self.uid.clone(),
            platform: Platform::Hosting,
            state: map_state(state.unwrap_or_default()),
            url: self.url.as_ref().map(|u| {
                if u.starts_with("http") {
                    u.clone()
                } else {
                    format!("https://{}", u)
                }
            }),
            created_at: created.and_then(millis_to_utc).unwrap_or_else(Utc::now),
            ready_at: self.ready.and_then(millis_to_utc),
            error_message: self.error_message.clone(),
            source_revision: self
                .meta
                .get("githubCommitSha")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

/// Map a hosting state string onto the canonical lifecycle
pub fn map_state(state: &str) -> DeploymentState {
    match state.to_lowercase().as_str() {
        "ready" => DeploymentState::Ready,
        "building" | "initializing" => DeploymentState::Building,
        "error" => DeploymentState::Error,
        "canceled" | "cancelled" => DeploymentState::Canceled,
        _ => DeploymentState::Pending,
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// New deployment request
#[derive(Debug, Clone, Serialize)]
pub struct CreateDeployment<'a> {
    pub name: &'a str,
    pub target: &'a str,
    #[serde(rename = "deploymentId", skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<&'a str>,
    #[serde(rename = "gitSource", skip_serializing_if = "Option::is_none")]
    pub git_source: Option<GitSource<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitSource<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub org: &'a str,
    pub repo: &'a str,
    #[serde(rename = "ref")]
    pub git_ref: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedDeployment {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Link a project to a git repository
#[derive(Debug, Clone, Serialize)]
pub struct LinkRepository<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub repo: &'a str,
}

fn team_query(team_id: Option<&str>, has_query: bool) -> String {
    match team_id {
        Some(team) => format!("{}teamId={}", if has_query { "&" } else { "?" }, encode_query(team)),
        None => String::new(),
    }
}

impl HttpClient {
    /// Get the authenticated user
    pub async fn vercel_user(&self, token: &str) -> Result<VercelUserResponse, ReconcilerError> {
        self.get("/v2/user", token).await
    }

    /// Get a project by name or id
    pub async fn vercel_project(
        &self,
        project: &str,
        team_id: Option<&str>,
        token: &str,
    ) -> Result<VercelProject, ReconcilerError> {
        let path = format!(
            "/v9/projects/{}{}",
            encode_query(project),
            team_query(team_id, false)
        );
        self.get(&path, token).await
    }

    /// List the most recent deployments of a project
    pub async fn vercel_deployments(
        &self,
        project_id: &str,
        team_id: Option<&str>,
        limit: u32,
        token: &str,
    ) -> Result<Vec<VercelDeployment>, ReconcilerError> {
        let path = format!(
            "/v6/deployments?projectId={}&limit={}{}",
            encode_query(project_id),
            limit,
            team_query(team_id, true)
        );
        let response: VercelDeploymentsResponse = self.get(&path, token).await?;
        Ok(response.deployments)
    }

    /// Create a deployment (new build or redeploy of an existing one)
    pub async fn vercel_create_deployment(
        &self,
        request: &CreateDeployment<'_>,
        team_id: Option<&str>,
        token: &str,
    ) -> Result<CreatedDeployment, ReconcilerError> {
        let path = format!("/v13/deployments{}", team_query(team_id, false));
        self.post(&path, token, request).await
    }

    /// Link a project to a repository
    pub async fn vercel_link_repository(
        &self,
        project_id: &str,
        repository: &str,
        team_id: Option<&str>,
        token: &str,
    ) -> Result<(), ReconcilerError> {
        let path = format!(
            "/v9/projects/{}/link{}",
            encode_query(project_id),
            team_query(team_id, false)
        );
        self.post_no_content(
            &path,
            token,
            &LinkRepository {
                kind: "github",
                repo: repository,
            },
        )
        .await
    }

    /// Roll production back to an earlier deployment
    pub async fn vercel_rollback(
        &self,
        project_id: &str,
        deployment_id: &str,
        team_id: Option<&str>,
        token: &str,
    ) -> Result<(), ReconcilerError> {
        let path = format!(
            "/v9/projects/{}/rollback/{}{}",
            encode_query(project_id),
            encode_query(deployment_id),
            team_query(team_id, false)
        );
        self.post_no_content(&path, token, &serde_json::json!({}))
            .await
    }
}
