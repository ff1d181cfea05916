//! # Structured Logging
//!
//! Provides structured logging setup using the tracing ecosystem.
//!
//! Secret values never appear in log output; only paths, scopes, and
//! durations are recorded as structured fields.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::errors::{AgentError, Result};

static LOGGING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initialize structured logging.
///
/// Honours `RUST_LOG` when set; falls back to the given default level for
/// the agent's own crate. Safe to call more than once (e.g. from tests).
pub fn init_logging(default_level: &str) -> Result<()> {
    validate_level(default_level)?;

    LOGGING_INITIALIZED
        .get_or_try_init(|| {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("infisical_agent={}", default_level).into());

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init()
                .map_err(|e| AgentError::config(format!("Failed to initialize logging: {}", e)))
        })
        .map(|_| ())
}

fn validate_level(level: &str) -> Result<()> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(AgentError::config(format!(
            "Invalid log level '{}': must be one of trace, debug, info, warn, error",
            level
        ))),
    }
}
