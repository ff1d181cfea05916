//! # Error Handling
//!
//! Centralized error types for the agent.

pub mod types;

pub use types::{AgentError, Result};
