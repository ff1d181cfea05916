//! HTTP client for the Infisical API.
//!
//! The base URL is injected at construction — there is no process-wide
//! address state. Individual calls are bounded by the client-wide request
//! timeout; no additional per-render deadline is imposed.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use super::types::{CreatedLease, RawSecretsResponse, SecretsPage, TokenGrant, TokenGrantResponse};
use super::SecretSource;
use crate::errors::{AgentError, Result};
use crate::secrets::SecretString;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API base URL, `/api` suffix included (e.g. `https://app.infisical.com/api`)
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: "https://app.infisical.com/api".to_string(), timeout: 30 }
    }
}

/// Authenticated HTTP client for the Infisical API
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with the given configuration
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| AgentError::Http { source: e, context: "building HTTP client".into() })?;

        Ok(Self { client, base_url: config.base_url })
    }

    /// Authenticate a machine identity, obtaining an access token.
    pub async fn login(
        &self,
        client_id: &str,
        client_secret: &SecretString,
    ) -> Result<TokenGrant> {
        let url = format!("{}/v1/auth/universal-auth/login", self.base_url);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "clientId": client_id,
                "clientSecret": client_secret.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| AgentError::Http { source: e, context: "universal-auth login".into() })?;

        let grant: TokenGrantResponse = Self::json_body(response, "universal-auth login").await?;
        Ok(grant.into())
    }

    /// Renew an access token, extending its soft expiry.
    pub async fn renew_token(&self, token: &SecretString) -> Result<TokenGrant> {
        let url = format!("{}/v1/auth/token/renew", self.base_url);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "accessToken": token.expose_secret() }))
            .send()
            .await
            .map_err(|e| AgentError::Http { source: e, context: "token renew".into() })?;

        let grant: TokenGrantResponse = Self::json_body(response, "token renew").await?;
        Ok(grant.into())
    }

    async fn json_body<T: serde::de::DeserializeOwned>(
        response: Response,
        operation: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(status, response, operation).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::Http { source: e, context: format!("decoding {}", operation) })
    }

    async fn api_error(status: StatusCode, response: Response, operation: &str) -> AgentError {
        let body = response.text().await.unwrap_or_default();
        AgentError::api(format!("{} failed: {}", operation, body.trim()), status.as_u16())
    }
}

#[async_trait]
impl SecretSource for ApiClient {
    async fn get_secrets(
        &self,
        token: &SecretString,
        project_id: &str,
        environment: &str,
        secret_path: &str,
    ) -> Result<SecretsPage> {
        let url = format!("{}/v3/secrets/raw", self.base_url);
        debug!(project_id, environment, secret_path, "GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .query(&[
                ("workspaceId", project_id),
                ("environment", environment),
                ("secretPath", secret_path),
            ])
            .send()
            .await
            .map_err(|e| AgentError::Http { source: e, context: "fetching secrets".into() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(status, response, "fetching secrets").await);
        }

        // The fingerprint is the ETag header when the service sends one,
        // otherwise a digest of the body. Either way it is opaque.
        let header_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| AgentError::Http { source: e, context: "reading secrets body".into() })?;

        let etag = header_etag
            .unwrap_or_else(|| base64::engine::general_purpose::STANDARD.encode(Sha256::digest(&body)));

        let raw: RawSecretsResponse = serde_json::from_slice(&body)
            .map_err(|e| AgentError::Serialization { source: e, context: "secrets body".into() })?;

        Ok(SecretsPage { secrets: raw.secrets.into_iter().map(Into::into).collect(), etag })
    }

    async fn create_lease(
        &self,
        token: &SecretString,
        project_slug: &str,
        environment: &str,
        secret_path: &str,
        slug: &str,
        ttl: Option<&str>,
    ) -> Result<CreatedLease> {
        let url = format!("{}/v1/dynamic-secrets/leases", self.base_url);
        debug!(project_slug, environment, secret_path, slug, "POST {}", url);

        let mut body = json!({
            "projectSlug": project_slug,
            "environmentSlug": environment,
            "secretPath": secret_path,
            "slug": slug,
        });
        if let Some(ttl) = ttl.filter(|t| !t.is_empty()) {
            body["ttl"] = json!(ttl);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Http { source: e, context: "creating lease".into() })?;

        Self::json_body(response, "creating lease").await
    }
}
