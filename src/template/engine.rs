//! Handlebars-based template engine.
//!
//! Each render binds a fresh function namespace:
//!
//! - `{{secret "<project-id>" "<env-slug>" "<secret-path>"}}` — fetches the
//!   plain-text secrets for a scope as a list of `{name, value}` objects,
//!   iterable with `#each`. Fetching records the response fingerprint into
//!   the render's etag slot whenever it differs from the previous render's.
//! - `{{dynamic_secret "<project-slug>" "<env-slug>" "<path>" "<slug>" ["ttl"]}}`
//!   — returns the generated values of a live lease, creating one through the
//!   service when the registry has none for the identity key.
//! - `add` / `minus` — integer helpers, bound for file-sourced templates only.
//!
//! Helpers run during template evaluation and must be synchronous, so the
//! render executes on a blocking thread and helpers drive the async secret
//! source through a captured runtime handle. Workers render one template at
//! a time, so renders of one destination never overlap.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use handlebars::{
    handlebars_helper, Context, Handlebars, Helper, RenderContext, RenderError,
    RenderErrorReason, ScopedJson,
};
use tokio::runtime::Handle;

use crate::api::SecretSource;
use crate::errors::{AgentError, Result};
use crate::leases::{DynamicSecretLease, LeaseKey, LeaseRegistry};
use crate::secrets::{expand_secrets, SecretString};

/// Where a template's text comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Read from a file at render time
    File(PathBuf),
    /// Inline base64-encoded content
    Inline(String),
}

/// One render invocation.
pub struct RenderRequest {
    pub template_id: usize,
    pub source: TemplateSource,
    pub token: SecretString,
    /// Fingerprint observed by the last written render
    pub previous_etag: String,
    /// Write-back slot: updated by the `secret` function when the fetched
    /// fingerprint differs from `previous_etag`
    pub current_etag: Arc<Mutex<String>>,
}

/// Renders templates against a secret source and the shared lease registry.
pub struct TemplateRenderer {
    source: Arc<dyn SecretSource>,
    leases: Arc<LeaseRegistry>,
}

impl TemplateRenderer {
    pub fn new(source: Arc<dyn SecretSource>, leases: Arc<LeaseRegistry>) -> Self {
        Self { source, leases }
    }

    /// Evaluate the template, returning the rendered bytes.
    ///
    /// Any function invocation failure (network, auth, decode) aborts the
    /// render and surfaces here unchanged.
    pub async fn render(&self, request: RenderRequest) -> Result<Vec<u8>> {
        let (template_text, numeric_helpers) = match &request.source {
            TemplateSource::File(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AgentError::template(format!(
                        "unable to read template at '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                (text, true)
            }
            TemplateSource::Inline(encoded) => {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| {
                        AgentError::template(format!("invalid base64 template content: {}", e))
                    })?;
                let text = String::from_utf8(decoded).map_err(|e| {
                    AgentError::template(format!("template content is not UTF-8: {}", e))
                })?;
                (text, false)
            }
        };

        let secret_helper = SecretHelper {
            handle: Handle::current(),
            source: Arc::clone(&self.source),
            token: request.token.clone(),
            previous_etag: request.previous_etag.clone(),
            current_etag: Arc::clone(&request.current_etag),
        };
        let dynamic_helper = DynamicSecretHelper {
            handle: Handle::current(),
            source: Arc::clone(&self.source),
            leases: Arc::clone(&self.leases),
            token: request.token,
            template_id: request.template_id,
        };

        let rendered = tokio::task::spawn_blocking(move || {
            let mut registry = Handlebars::new();
            registry.set_strict_mode(false);
            registry.register_helper("secret", Box::new(secret_helper));
            registry.register_helper("dynamic_secret", Box::new(dynamic_helper));
            if numeric_helpers {
                handlebars_helper!(add: |a: i64, b: i64| a + b);
                handlebars_helper!(minus: |a: i64, b: i64| a - b);
                registry.register_helper("add", Box::new(add));
                registry.register_helper("minus", Box::new(minus));
            }

            registry.render_template(&template_text, &serde_json::Value::Null)
        })
        .await
        .map_err(|e| AgentError::template(format!("render task failed: {}", e)))?
        .map_err(|e| AgentError::template(e.to_string()))?;

        Ok(rendered.into_bytes())
    }
}

fn str_param(h: &Helper<'_>, index: usize, name: &str) -> std::result::Result<String, RenderError> {
    h.param(index)
        .and_then(|p| p.value().as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RenderErrorReason::Other(format!(
                "{}: argument {} must be a string",
                name,
                index + 1
            ))
            .into()
        })
}

fn helper_failure(name: &str, error: AgentError) -> RenderError {
    RenderErrorReason::Other(format!("{} function failed: {}", name, error)).into()
}

/// `secret` template function: fetch + expand the plain-text secrets for a
/// scope, recording the fingerprint into the render's etag slot.
struct SecretHelper {
    handle: Handle,
    source: Arc<dyn SecretSource>,
    token: SecretString,
    previous_etag: String,
    current_etag: Arc<Mutex<String>>,
}

impl handlebars::HelperDef for SecretHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'rc>, RenderError> {
        let project_id = str_param(h, 0, "secret")?;
        let environment = str_param(h, 1, "secret")?;
        let secret_path = str_param(h, 2, "secret")?;

        let page = self
            .handle
            .block_on(self.source.get_secrets(&self.token, &project_id, &environment, &secret_path))
            .map_err(|e| helper_failure("secret", e))?;

        if page.etag != self.previous_etag {
            *self.current_etag.lock().expect("etag slot poisoned") = page.etag.clone();
        }

        let expanded = expand_secrets(page.secrets);
        let value = serde_json::to_value(expanded)
            .map_err(|e| RenderErrorReason::Other(format!("secret: {}", e)))?;

        Ok(ScopedJson::Derived(value))
    }
}

/// `dynamic_secret` template function: serve a live lease from the registry
/// or create one through the service.
struct DynamicSecretHelper {
    handle: Handle,
    source: Arc<dyn SecretSource>,
    leases: Arc<LeaseRegistry>,
    token: SecretString,
    template_id: usize,
}

impl handlebars::HelperDef for DynamicSecretHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'rc>, RenderError> {
        let arg_count = h.params().len();
        if arg_count != 4 && arg_count != 5 {
            return Err(RenderErrorReason::Other(format!(
                "dynamic_secret: expected 4 or 5 arguments, got {} (template {})",
                arg_count, self.template_id
            ))
            .into());
        }

        let key = LeaseKey::new(
            str_param(h, 0, "dynamic_secret")?,
            str_param(h, 1, "dynamic_secret")?,
            str_param(h, 2, "dynamic_secret")?,
            str_param(h, 3, "dynamic_secret")?,
        );
        let ttl = if arg_count == 5 { Some(str_param(h, 4, "dynamic_secret")?) } else { None };

        if let Some(lease) = self.leases.get(&key) {
            self.leases.register_template(&key, self.template_id);
            return Ok(ScopedJson::Derived(serde_json::Value::Object(lease.data)));
        }

        let created = self
            .handle
            .block_on(self.source.create_lease(
                &self.token,
                &key.project_slug,
                &key.environment,
                &key.secret_path,
                &key.slug,
                ttl.as_deref(),
            ))
            .map_err(|e| helper_failure("dynamic_secret", e))?;

        self.leases.append(DynamicSecretLease {
            lease_id: created.lease.id,
            expires_at: created.lease.expire_at,
            key,
            data: created.data.clone(),
            template_ids: BTreeSet::from([self.template_id]),
        });

        Ok(ScopedJson::Derived(serde_json::Value::Object(created.data)))
    }
}
