//! GitHub REST API client

use serde::{Deserialize, Serialize};

use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;

/// Authenticated user
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// Repository metadata
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
}

/// Commit on a branch
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitHubCommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitDetail {
    pub message: String,
}

/// Workflow dispatch request
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDispatch<'a> {
    #[serde(rename = "ref")]
    pub git_ref: &'a str,
}

impl HttpClient {
    /// Get the authenticated user
    pub async fn github_user(&self, token: &str) -> Result<GitHubUser, ReconcilerError> {
        self.get("/user", token).await
    }

    /// Get repository metadata
    pub async fn github_repo(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> Result<GitHubRepo, ReconcilerError> {
        let path = format!("/repos/{}/{}", owner, repo);
        self.get(&path, token).await
    }

    /// Get the head commit of a branch
    pub async fn github_head_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        token: &str,
    ) -> Result<GitHubCommit, ReconcilerError> {
        let path = format!("/repos/{}/{}/commits/{}", owner, repo, branch);
        self.get(&path, token).await
    }

    /// Dispatch a workflow run on a ref
    pub async fn github_dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow: &str,
        git_ref: &str,
        token: &str,
    ) -> Result<(), ReconcilerError> {
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/dispatches",
            owner, repo, workflow
        );
        self.post_no_content(&path, token, &WorkflowDispatch { git_ref })
            .await
    }
}
