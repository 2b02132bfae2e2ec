//! OAuth2 client-credentials token manager for Microsoft Graph

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;

/// Refresh this long before the token actually expires
const GRACE_PERIOD_SECS: i64 = 300;

/// Token manager trait for testability
#[async_trait]
pub trait TokenManagerExt: Send + Sync {
    /// Get a valid access token, acquiring one when the cache is empty or expiring
    async fn get_token(&self) -> Result<SecretString, ReconcilerError>;

    /// Drop the cached token and acquire a new one
    async fn refresh_token(&self) -> Result<SecretString, ReconcilerError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(GRACE_PERIOD_SECS) >= self.expires_at
    }
}

/// Client-credentials token manager for one tenant
pub struct GraphTokenManager {
    http_client: Arc<HttpClient>,
    token_url: String,
    scope: String,
    client_id: String,
    client_secret: SecretString,
    cached_token: RwLock<Option<CachedToken>>,
}

impl GraphTokenManager {
    pub fn new(
        http_client: Arc<HttpClient>,
        login_url: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: SecretString,
    ) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            login_url.trim_end_matches('/'),
            tenant_id
        );
        let scope = graph_scope(http_client.base_url());

        Self {
            http_client,
            token_url,
            scope,
            client_id: client_id.to_string(),
            client_secret,
            cached_token: RwLock::new(None),
        }
    }

    async fn acquire_token(&self) -> Result<SecretString, ReconcilerError> {
        debug!("Requesting Graph access token from {}", self.token_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", self.scope.as_str()),
        ];

        let response: TokenResponse = self
            .http_client
            .post_form(&self.token_url, &form)
            .await
            .map_err(|e| match e {
                ReconcilerError::TransportError(_) => e,
                other => ReconcilerError::AuthError(format!("Token request failed: {}", other)),
            })?;

        let expires_at = Utc::now() + Duration::seconds(response.expires_in);
        info!("Acquired Graph access token, expires at {}", expires_at);

        let mut cached = self.cached_token.write().await;
        *cached = Some(CachedToken {
            access_token: SecretString::from(response.access_token.clone()),
            expires_at,
        });

        Ok(SecretString::from(response.access_token))
    }
}

#[async_trait]
impl TokenManagerExt for GraphTokenManager {
    async fn get_token(&self) -> Result<SecretString, ReconcilerError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired(Utc::now()) {
                    return Ok(SecretString::from(
                        token.access_token.expose_secret().to_owned(),
                    ));
                }
            }
        }

        self.acquire_token().await
    }

    async fn refresh_token(&self) -> Result<SecretString, ReconcilerError> {
        info!("Refreshing Graph access token...");
        {
            let mut cached = self.cached_token.write().await;
            *cached = None;
        }
        self.acquire_token().await
    }
}

/// Stand-in for a tenant whose client secret is not configured
pub struct MissingCredentials {
    tenant_id: String,
}

impl MissingCredentials {
    pub fn new(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
        }
    }

    fn error(&self) -> ReconcilerError {
        ReconcilerError::AuthError(format!(
            "no Graph client secret configured for tenant {}",
            self.tenant_id
        ))
    }
}

#[async_trait]
impl TokenManagerExt for MissingCredentials {
    async fn get_token(&self) -> Result<SecretString, ReconcilerError> {
        Err(self.error())
    }

    async fn refresh_token(&self) -> Result<SecretString, ReconcilerError> {
        Err(self.error())
    }
}

/// `.default` scope of the Graph host behind a versioned API URL
fn graph_scope(graph_url: &str) -> String {
    match url::Url::parse(graph_url) {
        Ok(parsed) => format!("{}/.default", parsed.origin().ascii_serialization()),
        Err(_) => "https://graph.microsoft.com/.default".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_scope_strips_version() {
        assert_eq!(
            graph_scope("https://graph.microsoft.com/v1.0"),
            "https://graph.microsoft.com/.default"
        );
        assert_eq!(
            graph_scope("http://127.0.0.1:9000/graph"),
            "http://127.0.0.1:9000/.default"
        );
    }

    #[test]
    fn test_cached_token_grace_period() {
        let now = Utc::now();
        let fresh = CachedToken {
            access_token: SecretString::from("t".to_string()),
            expires_at: now + Duration::minutes(10),
        };
        let expiring = CachedToken {
            access_token: SecretString::from("t".to_string()),
            expires_at: now + Duration::minutes(4),
        };

        assert!(!fresh.is_expired(now));
        assert!(expiring.is_expired(now));
    }

    #[test]
    fn test_token_url() {
        let client = Arc::new(
            HttpClient::new("https://graph.microsoft.com/v1.0", std::time::Duration::from_secs(1))
                .unwrap(),
        );
        let manager = GraphTokenManager::new(
            client,
            "https://login.microsoftonline.com/",
            "tenant-1",
            "client-1",
            SecretString::from("secret".to_string()),
        );

        assert_eq!(
            manager.token_url,
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(manager.scope, "https://graph.microsoft.com/.default");
    }

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let tokens = MissingCredentials::new("tenant-1");
        let err = tokens.refresh_token().await.err().unwrap();
        assert!(matches!(err, ReconcilerError::AuthError(_)));
        assert!(err.to_string().contains("tenant-1"));
    }
}
