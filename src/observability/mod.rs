//! # Observability
//!
//! Structured logging setup for the agent.

pub mod logging;

pub use logging::init_logging;
