//! # Template Rendering
//!
//! Evaluates user-supplied templates against the secrets service. Templates
//! invoke the `secret` and `dynamic_secret` functions to pull material; the
//! resulting byte buffer is what the template worker writes to disk.

pub mod engine;

pub use engine::{RenderRequest, TemplateRenderer, TemplateSource};
