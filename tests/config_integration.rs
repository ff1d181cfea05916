//! Integration tests for configuration resolution.
//!
//! These validate the two config sources (file and base64 environment
//! variable) and their precedence.

use std::sync::Mutex;

use base64::Engine as _;
use infisical_agent::config::{AgentConfig, CONFIG_BASE64_ENV};

// Serializes tests that modify environment variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const CONFIG_YAML: &str = r#"
infisical:
  address: "https://secrets.example.com"
auth:
  type: "universal-auth"
  config:
    client-id: /etc/agent/client-id
    client-secret: /etc/agent/client-secret
sinks:
  - type: "file"
    config:
      path: /run/agent/token
templates:
  - source-path: /etc/agent/app.tpl
    destination-path: /run/secrets/app.env
"#;

#[test]
fn test_load_from_file() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::remove_var(CONFIG_BASE64_ENV);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-config.yaml");
    std::fs::write(&path, CONFIG_YAML).unwrap();

    let config = AgentConfig::load(&path).unwrap();
    assert_eq!(config.infisical.address, "https://secrets.example.com");
    assert_eq!(config.api_base_url(), "https://secrets.example.com/api");
    assert_eq!(config.templates.len(), 1);
}

#[test]
fn test_load_from_base64_env_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let env_yaml = CONFIG_YAML.replace("secrets.example.com", "env.example.com");
    std::env::set_var(
        CONFIG_BASE64_ENV,
        base64::engine::general_purpose::STANDARD.encode(env_yaml),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-config.yaml");
    std::fs::write(&path, CONFIG_YAML).unwrap();

    let config = AgentConfig::load(&path).unwrap();
    std::env::remove_var(CONFIG_BASE64_ENV);

    // The environment variable wins over the file.
    assert_eq!(config.infisical.address, "https://env.example.com");
}

#[test]
fn test_invalid_base64_env_is_fatal() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::set_var(CONFIG_BASE64_ENV, "%%% not base64 %%%");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-config.yaml");
    std::fs::write(&path, CONFIG_YAML).unwrap();

    let result = AgentConfig::load(&path);
    std::env::remove_var(CONFIG_BASE64_ENV);

    let err = result.unwrap_err();
    assert!(err.to_string().contains("base64"));
}

#[test]
fn test_missing_file_and_unset_env_is_fatal() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::remove_var(CONFIG_BASE64_ENV);

    let dir = tempfile::tempdir().unwrap();
    let err = AgentConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("Unable to read agent config"));
}
