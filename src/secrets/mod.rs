//! # Secret Material Handling
//!
//! Types and helpers for secret values that pass through the agent: a
//! redacting string wrapper so credentials never leak into logs, and the
//! recursive `${name}` reference expansion applied to fetched secrets.

pub mod expand;
pub mod types;

pub use expand::expand_secrets;
pub use types::{SecretEntry, SecretString};
