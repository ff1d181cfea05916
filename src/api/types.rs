//! Wire types for the Infisical API.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Map;
use std::time::Duration;

use crate::secrets::{SecretEntry, SecretString};

/// An access token together with its lifetimes, as issued by login/renew.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,
    /// Soft lifetime: refresh is allowed until this elapses
    pub ttl: Duration,
    /// Hard ceiling: beyond this a full re-authentication is required
    pub max_ttl: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenGrantResponse {
    pub access_token: SecretString,
    /// Token TTL in seconds
    pub expires_in: u64,
    /// Token max TTL in seconds
    #[serde(rename = "accessTokenMaxTTL")]
    pub access_token_max_ttl: u64,
}

impl From<TokenGrantResponse> for TokenGrant {
    fn from(res: TokenGrantResponse) -> Self {
        Self {
            access_token: res.access_token,
            ttl: Duration::from_secs(res.expires_in),
            max_ttl: Duration::from_secs(res.access_token_max_ttl),
        }
    }
}

/// A page of plain-text secrets plus the response fingerprint.
#[derive(Debug, Clone)]
pub struct SecretsPage {
    pub secrets: Vec<SecretEntry>,
    /// Opaque change-detection fingerprint for this scope
    pub etag: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSecretsResponse {
    pub secrets: Vec<RawSecret>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSecret {
    pub secret_key: String,
    pub secret_value: String,
}

impl From<RawSecret> for SecretEntry {
    fn from(raw: RawSecret) -> Self {
        SecretEntry::new(raw.secret_key, raw.secret_value)
    }
}

/// Lease metadata returned alongside generated secret data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseGrant {
    pub id: String,
    pub expire_at: DateTime<Utc>,
}

/// A freshly created dynamic-secret lease: metadata plus the generated values.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedLease {
    pub lease: LeaseGrant,
    #[serde(default)]
    pub data: Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_grant_from_response() {
        let json = r#"{"accessToken": "tok", "expiresIn": 7200, "accessTokenMaxTTL": 86400}"#;
        let res: TokenGrantResponse = serde_json::from_str(json).unwrap();
        let grant: TokenGrant = res.into();

        assert_eq!(grant.access_token.expose_secret(), "tok");
        assert_eq!(grant.ttl, Duration::from_secs(7200));
        assert_eq!(grant.max_ttl, Duration::from_secs(86400));
    }

    #[test]
    fn test_raw_secret_mapping() {
        let json = r#"{"secrets": [{"secretKey": "DB_HOST", "secretValue": "localhost"}]}"#;
        let res: RawSecretsResponse = serde_json::from_str(json).unwrap();
        let entry: SecretEntry = res.secrets.into_iter().next().unwrap().into();
        assert_eq!(entry.name, "DB_HOST");
        assert_eq!(entry.value, "localhost");
    }

    #[test]
    fn test_created_lease_parsing() {
        let json = r#"{
            "lease": {"id": "lease-1", "expireAt": "2026-08-02T10:00:00Z"},
            "data": {"DB_USERNAME": "u-abc", "DB_PASSWORD": "p-def"}
        }"#;
        let lease: CreatedLease = serde_json::from_str(json).unwrap();
        assert_eq!(lease.lease.id, "lease-1");
        assert_eq!(lease.data.get("DB_USERNAME").unwrap(), "u-abc");
    }
}
