//! # Infisical Agent
//!
//! A long-running daemon that authenticates to an Infisical instance with a
//! machine identity, keeps the issued access token alive through a renewal
//! lifecycle, and renders secret material into local files from user-supplied
//! templates so that co-located applications can read plain files instead of
//! talking to the secrets API directly.
//!
//! ## Architecture
//!
//! ```text
//! CLI → Supervisor → Token Lifecycle Manager ──► token sinks
//!              │                │
//!              │           access token
//!              ▼                ▼
//!        Template Workers → Template Renderer → rendered artifacts
//!                   │              │
//!             Lease Registry   Infisical API
//! ```
//!
//! ## Core Components
//!
//! - **Token Lifecycle Manager**: authenticates, refreshes, and re-authenticates
//!   the universal-auth access token, notifying subscribers on every change
//! - **Template Workers**: one task per configured template, polling on a
//!   cadence bounded by the earliest dynamic-secret lease expiry
//! - **Lease Registry**: in-memory cache of active dynamic-secret leases
//! - **Supervisor**: boots the system, wires channels, handles OS signals

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod leases;
pub mod observability;
pub mod secrets;
pub mod services;
pub mod startup;
pub mod template;

// Re-export commonly used types
pub use config::AgentConfig;
pub use errors::{AgentError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
