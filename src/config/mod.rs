//! # Configuration
//!
//! Agent configuration loading and validation. The config is immutable after
//! load: it is resolved once at boot from either the `--config` file or the
//! `INFISICAL_AGENT_CONFIG_BASE64` environment variable.

pub mod settings;

pub use settings::{
    AgentConfig, AuthConfig, ExecuteConfig, InfisicalConfig, Sink, SinkDetails, Template,
    TemplateOptions, UniversalAuthConfig, CONFIG_BASE64_ENV,
};
