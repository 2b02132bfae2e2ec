//! Microsoft Graph identity adapter

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::info;

use crate::adapters::{
    auth_outcome, unsupported, ActionOutcome, AdapterAction, PlatformAdapter, PlatformSnapshot,
};
use crate::authn::graph_token::TokenManagerExt;
use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;
use crate::http::graph::{mail_nickname, NewGroup};
use crate::models::platform::{ConnectionStatus, Platform};

/// Identity adapter: tenant directory and security groups
pub struct GraphIdentityAdapter {
    http_client: Arc<HttpClient>,
    token_manager: Arc<dyn TokenManagerExt>,
}

impl GraphIdentityAdapter {
    pub fn new(http_client: Arc<HttpClient>, token_manager: Arc<dyn TokenManagerExt>) -> Self {
        Self {
            http_client,
            token_manager,
        }
    }

    async fn tenant_name(&self, token: &str) -> Result<String, ReconcilerError> {
        let organizations = self.http_client.graph_organizations(token).await?;
        organizations
            .into_iter()
            .next()
            .map(|o| o.display_name)
            .ok_or_else(|| ReconcilerError::AuthError("token grants no organization".to_string()))
    }

    async fn ensure_group(
        &self,
        display_name: &str,
        description: &str,
    ) -> Result<ActionOutcome, ReconcilerError> {
        let token = self.token_manager.get_token().await?;
        let token = token.expose_secret();

        let existing = self
            .http_client
            .graph_groups_named(display_name, token)
            .await?;
        if let Some(group) = existing.into_iter().next() {
            return Ok(ActionOutcome::existing(group.id));
        }

        info!("Creating security group {}", display_name);
        let nickname = mail_nickname(display_name);
        let group = self
            .http_client
            .graph_create_group(
                &NewGroup {
                    display_name,
                    description,
                    mail_enabled: false,
                    mail_nickname: &nickname,
                    security_enabled: true,
                },
                token,
            )
            .await?;
        Ok(ActionOutcome::created(group.id))
    }
}

#[async_trait]
impl PlatformAdapter for GraphIdentityAdapter {
    fn platform(&self) -> Platform {
        Platform::Identity
    }

    fn name(&self) -> &str {
        "graph-identity"
    }

    async fn check_auth(&self) -> Result<ConnectionStatus, ReconcilerError> {
        let result = match self.token_manager.get_token().await {
            Ok(token) => self.tenant_name(token.expose_secret()).await,
            Err(e) => Err(e),
        };
        auth_outcome(self.platform(), result)
    }

    async fn get_current_state(&self) -> Result<PlatformSnapshot, ReconcilerError> {
        let token = self.token_manager.get_token().await?;
        let token = token.expose_secret();

        let tenant = self.tenant_name(token).await?;
        let groups = self
            .http_client
            .graph_security_groups(token)
            .await?
            .into_iter()
            .map(|g| g.display_name)
            .collect();

        Ok(PlatformSnapshot::Identity { tenant, groups })
    }

    async fn trigger_action(
        &self,
        action: AdapterAction,
    ) -> Result<ActionOutcome, ReconcilerError> {
        match action {
            AdapterAction::ReAuthenticate => {
                let token = self.token_manager.refresh_token().await?;
                let tenant = self.tenant_name(token.expose_secret()).await?;
                Ok(ActionOutcome::existing(tenant))
            }
            AdapterAction::EnsureGroup {
                display_name,
                description,
            } => self.ensure_group(&display_name, &description).await,
            other => Err(unsupported(self.name(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;

    struct RejectingTokens;

    #[async_trait]
    impl TokenManagerExt for RejectingTokens {
        async fn get_token(&self) -> Result<SecretString, ReconcilerError> {
            Err(ReconcilerError::AuthError("invalid_client".to_string()))
        }

        async fn refresh_token(&self) -> Result<SecretString, ReconcilerError> {
            self.get_token().await
        }
    }

    fn adapter() -> GraphIdentityAdapter {
        let client =
            Arc::new(HttpClient::new("http://127.0.0.1:9/v1.0", Duration::from_secs(1)).unwrap());
        GraphIdentityAdapter::new(client, Arc::new(RejectingTokens))
    }

    #[tokio::test]
    async fn test_rejected_credentials_report_disconnected() {
        let status = adapter().check_auth().await.unwrap();
        assert!(!status.authenticated);
        assert_eq!(status.platform, Platform::Identity);
        assert_eq!(status.error.as_deref(), Some("invalid_client"));
    }

    #[tokio::test]
    async fn test_reauthenticate_surfaces_auth_error() {
        let err = adapter()
            .trigger_action(AdapterAction::ReAuthenticate)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::AuthError(_)));
    }
}
