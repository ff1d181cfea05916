//! # Configuration Settings
//!
//! Defines the agent configuration structure and its YAML mapping.
//!
//! ```yaml
//! infisical:
//!   address: "https://app.infisical.com"
//!   exit-after-auth: false
//! auth:
//!   type: "universal-auth"
//!   config:
//!     client-id: /etc/infisical/client-id
//!     client-secret: /etc/infisical/client-secret
//!     remove_client_secret_on_read: false
//! sinks:
//!   - type: "file"
//!     config:
//!       path: /run/infisical/token
//! templates:
//!   - source-path: /etc/infisical/db.tpl
//!     destination-path: /run/secrets/db.env
//!     config:
//!       polling-interval: 5m
//!       execute:
//!         command: systemctl reload app
//!         timeout: 30
//! ```

use std::path::Path;

use base64::Engine;
use serde::Deserialize;
use tracing::info;

use crate::errors::{AgentError, Result};

/// Environment variable carrying a base64-encoded config document, taking
/// precedence over the `--config` file.
pub const CONFIG_BASE64_ENV: &str = "INFISICAL_AGENT_CONFIG_BASE64";

/// Address used when the config omits `infisical.address`.
const DEFAULT_CLOUD_ADDRESS: &str = "https://app.infisical.com";

/// Top-level agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub infisical: InfisicalConfig,
    pub auth: AuthConfig,
    pub sinks: Vec<Sink>,
    pub templates: Vec<Template>,
}

/// Connection settings for the Infisical instance
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InfisicalConfig {
    /// Base address of the instance (no `/api` suffix required)
    #[serde(default)]
    pub address: String,

    /// Terminate shortly after the first successful authentication
    #[serde(rename = "exit-after-auth", default)]
    pub exit_after_auth: bool,
}

/// Authentication method configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub kind: String,
    pub universal_auth: UniversalAuthConfig,
}

/// Universal-auth (machine identity) credential locations
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UniversalAuthConfig {
    /// Path to the file holding the client id
    #[serde(rename = "client-id", default)]
    pub client_id_path: String,

    /// Path to the file holding the client secret
    #[serde(rename = "client-secret", default)]
    pub client_secret_path: String,

    /// Unlink the client secret file after the first successful read
    #[serde(default)]
    pub remove_client_secret_on_read: bool,
}

/// An output destination for the raw access token
#[derive(Debug, Clone, Deserialize)]
pub struct Sink {
    /// Sink kind; only `file` is supported, other kinds are logged and
    /// skipped at write time
    #[serde(rename = "type")]
    pub kind: String,

    pub config: SinkDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkDetails {
    pub path: String,
}

/// A secret template and its render destination
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    /// Path to a template file on disk
    #[serde(rename = "source-path", default)]
    pub source_path: Option<String>,

    /// Inline template content, base64-encoded
    #[serde(rename = "base64-template-content", default)]
    pub base64_template_content: Option<String>,

    /// Absolute path the rendered artifact is written to
    #[serde(rename = "destination-path")]
    pub destination_path: String,

    #[serde(default)]
    pub config: TemplateOptions,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TemplateOptions {
    /// How often to poll for changes (humantime string, default 5m)
    #[serde(rename = "polling-interval", default)]
    pub polling_interval: Option<String>,

    #[serde(default)]
    pub execute: ExecuteConfig,
}

/// Post-render hook
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExecuteConfig {
    /// Shell command run after a changed artifact is written
    #[serde(default)]
    pub command: Option<String>,

    /// Command deadline in seconds; 0 disables the deadline
    #[serde(default)]
    pub timeout: i64,
}

// Mirror of the YAML document before the auth section is narrowed to a
// concrete method.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    infisical: InfisicalConfig,
    auth: RawAuthConfig,
    #[serde(default)]
    sinks: Vec<Sink>,
    #[serde(default)]
    templates: Vec<Template>,
}

#[derive(Debug, Deserialize)]
struct RawAuthConfig {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: serde_yaml::Value,
}

impl AgentConfig {
    /// Resolve and parse the agent configuration.
    ///
    /// `INFISICAL_AGENT_CONFIG_BASE64` takes precedence over the config
    /// file; when neither is available this is a fatal startup error.
    pub fn load(config_path: &Path) -> Result<Self> {
        let bytes = match std::env::var(CONFIG_BASE64_ENV) {
            Ok(encoded) if !encoded.is_empty() => {
                base64::engine::general_purpose::STANDARD.decode(encoded.trim()).map_err(|e| {
                    AgentError::config(format!(
                        "Unable to decode {} as base64: {}",
                        CONFIG_BASE64_ENV, e
                    ))
                })?
            }
            _ => std::fs::read(config_path).map_err(|e| {
                AgentError::config(format!(
                    "Unable to read agent config at '{}': {}. Provide a config file or set {}",
                    config_path.display(),
                    e,
                    CONFIG_BASE64_ENV
                ))
            })?,
        };

        Self::parse(&bytes)
    }

    /// Parse a YAML config document and apply defaults.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut raw: RawConfig = serde_yaml::from_slice(bytes)
            .map_err(|e| AgentError::Yaml { source: e, context: "agent config".to_string() })?;

        if raw.infisical.address.is_empty() {
            raw.infisical.address = DEFAULT_CLOUD_ADDRESS.to_string();
        }

        info!(address = %raw.infisical.address, "Infisical instance address set");

        let auth = match raw.auth.kind.as_str() {
            "universal-auth" => {
                // An omitted auth.config section behaves like an empty one;
                // credentials may still arrive via environment variables.
                let section = if raw.auth.config.is_null() {
                    serde_yaml::Value::Mapping(Default::default())
                } else {
                    raw.auth.config
                };
                let universal_auth: UniversalAuthConfig = serde_yaml::from_value(section)
                    .map_err(|e| AgentError::Yaml {
                    source: e,
                    context: "universal-auth config".to_string(),
                })?;
                AuthConfig { kind: raw.auth.kind, universal_auth }
            }
            other => {
                return Err(AgentError::config(format!(
                    "Unknown auth type '{}': only 'universal-auth' is supported",
                    other
                )))
            }
        };

        let config = Self {
            infisical: raw.infisical,
            auth,
            sinks: raw.sinks,
            templates: raw.templates,
        };
        config.validate()?;

        Ok(config)
    }

    /// The API base URL: the instance address with `/api` appended unless
    /// already present.
    pub fn api_base_url(&self) -> String {
        append_api_endpoint(&self.infisical.address)
    }

    fn validate(&self) -> Result<()> {
        for (index, template) in self.templates.iter().enumerate() {
            let has_source = template.source_path.as_deref().is_some_and(|p| !p.is_empty());
            let has_inline =
                template.base64_template_content.as_deref().is_some_and(|c| !c.is_empty());

            if has_source == has_inline {
                return Err(AgentError::config(format!(
                    "Template {}: exactly one of source-path or base64-template-content must be set",
                    index + 1
                )));
            }

            if template.destination_path.is_empty() {
                return Err(AgentError::config(format!(
                    "Template {}: destination-path must not be empty",
                    index + 1
                )));
            }
        }

        Ok(())
    }
}

fn append_api_endpoint(address: &str) -> String {
    if address.ends_with("/api") {
        return address.to_string();
    }
    if address.ends_with('/') {
        return format!("{}api", address);
    }
    format!("{}/api", address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
infisical:
  address: "https://secrets.example.com"
  exit-after-auth: true
auth:
  type: "universal-auth"
  config:
    client-id: /etc/agent/client-id
    client-secret: /etc/agent/client-secret
    remove_client_secret_on_read: true
sinks:
  - type: "file"
    config:
      path: /run/agent/token
templates:
  - source-path: /etc/agent/db.tpl
    destination-path: /run/secrets/db.env
    config:
      polling-interval: 2m
      execute:
        command: systemctl reload app
        timeout: 30
  - base64-template-content: e3sgc2VjcmV0IH19
    destination-path: /run/secrets/inline.env
"#;

    #[test]
    fn test_parse_full_config() {
        let config = AgentConfig::parse(FULL_CONFIG.as_bytes()).unwrap();

        assert_eq!(config.infisical.address, "https://secrets.example.com");
        assert!(config.infisical.exit_after_auth);
        assert_eq!(config.auth.kind, "universal-auth");
        assert_eq!(config.auth.universal_auth.client_id_path, "/etc/agent/client-id");
        assert!(config.auth.universal_auth.remove_client_secret_on_read);
        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sinks[0].kind, "file");
        assert_eq!(config.templates.len(), 2);

        let first = &config.templates[0];
        assert_eq!(first.config.polling_interval.as_deref(), Some("2m"));
        assert_eq!(first.config.execute.command.as_deref(), Some("systemctl reload app"));
        assert_eq!(first.config.execute.timeout, 30);

        let second = &config.templates[1];
        assert!(second.source_path.is_none());
        assert!(second.base64_template_content.is_some());
    }

    #[test]
    fn test_address_defaults_to_cloud() {
        let yaml = r#"
auth:
  type: "universal-auth"
  config:
    client-id: /id
    client-secret: /secret
"#;
        let config = AgentConfig::parse(yaml.as_bytes()).unwrap();
        assert_eq!(config.infisical.address, "https://app.infisical.com");
        assert_eq!(config.api_base_url(), "https://app.infisical.com/api");
    }

    #[test]
    fn test_api_endpoint_normalisation() {
        assert_eq!(append_api_endpoint("https://x.dev"), "https://x.dev/api");
        assert_eq!(append_api_endpoint("https://x.dev/"), "https://x.dev/api");
        assert_eq!(append_api_endpoint("https://x.dev/api"), "https://x.dev/api");
    }

    #[test]
    fn test_unknown_auth_type_rejected() {
        let yaml = r#"
auth:
  type: "oauth"
  config: {}
"#;
        let err = AgentConfig::parse(yaml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Unknown auth type"));
    }

    #[test]
    fn test_template_requires_exactly_one_source() {
        let neither = r#"
auth:
  type: "universal-auth"
  config: {}
templates:
  - destination-path: /out
"#;
        assert!(AgentConfig::parse(neither.as_bytes()).is_err());

        let both = r#"
auth:
  type: "universal-auth"
  config: {}
templates:
  - source-path: /tpl
    base64-template-content: aGk=
    destination-path: /out
"#;
        assert!(AgentConfig::parse(both.as_bytes()).is_err());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = AgentConfig::parse(b"auth: [").unwrap_err();
        assert!(matches!(err, AgentError::Yaml { .. }));
    }
}
