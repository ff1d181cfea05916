//! # Infisical API Client
//!
//! Outbound client for the four logical calls the agent makes against the
//! service: universal-auth login, token renewal, plain-text secret retrieval,
//! and dynamic-secret lease creation.
//!
//! The template renderer only sees the [`SecretSource`] capability, so it
//! never depends on the concrete HTTP client (and the client never depends on
//! the renderer or the lease registry).

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::errors::Result;
use crate::secrets::SecretString;

pub use client::{ApiClient, ApiConfig};
pub use types::{CreatedLease, LeaseGrant, SecretsPage, TokenGrant};

/// The slice of the service API a template render needs.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the plain-text secrets for a scope, together with the
    /// response's change-detection fingerprint.
    async fn get_secrets(
        &self,
        token: &SecretString,
        project_id: &str,
        environment: &str,
        secret_path: &str,
    ) -> Result<SecretsPage>;

    /// Create a dynamic-secret lease for a scope. `ttl` is the optional
    /// caller-requested lease lifetime, passed through verbatim.
    async fn create_lease(
        &self,
        token: &SecretString,
        project_slug: &str,
        environment: &str,
        secret_path: &str,
        slug: &str,
        ttl: Option<&str>,
    ) -> Result<CreatedLease>;
}
