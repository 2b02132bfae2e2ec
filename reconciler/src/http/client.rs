//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::ReconcilerError;

/// HTTP client for one platform API
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ReconcilerError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reconciler/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, ReconcilerError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let request = self.client.get(&url).bearer_auth(token);
        let response = send(request, "GET", &url).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<T, ReconcilerError> {
        let url = self.url(path);
        debug!("POST {}", url);

        let request = self.client.post(&url).bearer_auth(token).json(body);
        let response = send(request, "POST", &url).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request whose response carries no body (e.g. 204)
    pub async fn post_no_content<B: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<(), ReconcilerError> {
        let url = self.url(path);
        debug!("POST {}", url);

        let request = self.client.post(&url).bearer_auth(token).json(body);
        send(request, "POST", &url).await?;
        Ok(())
    }

    /// Make a PATCH request, ignoring the response body
    pub async fn patch<B: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<(), ReconcilerError> {
        let url = self.url(path);
        debug!("PATCH {}", url);

        let request = self.client.patch(&url).bearer_auth(token).json(body);
        send(request, "PATCH", &url).await?;
        Ok(())
    }

    /// POST a form to an absolute URL without bearer auth
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ReconcilerError> {
        debug!("POST {} (form)", url);

        let request = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .form(form);
        let response = send(request, "POST", url).await?;
        Ok(response.json().await?)
    }

    /// Unauthenticated GET against an absolute URL, returning only the status
    pub async fn probe(&self, url: &str, timeout: Duration) -> Result<StatusCode, ReconcilerError> {
        debug!("PROBE {}", url);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error("GET", url, e))?;
        Ok(response.status())
    }
}

async fn send(request: RequestBuilder, method: &str, url: &str) -> Result<Response, ReconcilerError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(method, url, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("HTTP {} {} failed: {} - {}", method, url, status, body);
    Err(classify_status(status, body))
}

fn transport_error(method: &str, url: &str, err: reqwest::Error) -> ReconcilerError {
    ReconcilerError::TransportError(format!("{} {}: {}", method, url, err))
}

/// Map a non-success HTTP status onto the error taxonomy
pub fn classify_status(status: StatusCode, body: String) -> ReconcilerError {
    let detail = format!("{}: {}", status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ReconcilerError::AuthError(detail),
        StatusCode::NOT_FOUND => ReconcilerError::NotFound(detail),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            ReconcilerError::TransportError(detail)
        }
        _ => ReconcilerError::ConfigError(detail),
    }
}
