//! Template worker: one task per configured template.
//!
//! Each tick prunes expired leases, renders the template with the current
//! access token, and writes the artifact when the content fingerprint
//! changed (or on the first run). The sleep between ticks is the polling
//! interval, shortened to the soonest grace-adjusted lease expiry so
//! dynamic secrets are re-rendered before the service revokes them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Template;
use crate::errors::{AgentError, Result};
use crate::leases::LeaseRegistry;
use crate::services::command::execute_with_timeout;
use crate::services::sink::write_artifact;
use crate::services::token_manager::TokenManager;
use crate::template::{RenderRequest, TemplateRenderer, TemplateSource};

/// Polling cadence when the template does not configure one.
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Short retry while the first token is still being fetched, so the first
/// render is not delayed by a full polling interval.
const EMPTY_TOKEN_RETRY: Duration = Duration::from_secs(3);

/// Parse a `polling-interval` string such as `30s`, `5m`, or `1h 30m`.
pub fn parse_polling_interval(value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| AgentError::invalid_duration(value, e.to_string()))
}

/// Renders one template on a polling cadence until shutdown.
pub struct TemplateWorker {
    template_id: usize,
    template: Template,
    renderer: Arc<TemplateRenderer>,
    leases: Arc<LeaseRegistry>,
    tokens: Arc<TokenManager>,
    /// Used to bring the whole agent down on worker-fatal conditions
    shutdown_tx: Arc<watch::Sender<bool>>,
    existing_etag: String,
    current_etag: Arc<Mutex<String>>,
    first_run: bool,
}

impl TemplateWorker {
    pub fn new(
        template_id: usize,
        template: Template,
        renderer: Arc<TemplateRenderer>,
        leases: Arc<LeaseRegistry>,
        tokens: Arc<TokenManager>,
        shutdown_tx: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            template_id,
            template,
            renderer,
            leases,
            tokens,
            shutdown_tx,
            existing_etag: String::new(),
            current_etag: Arc::new(Mutex::new(String::new())),
            first_run: true,
        }
    }

    /// Poll until shutdown. A malformed polling interval is fatal for the
    /// whole agent: it signals shutdown and returns.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let polling_interval = match &self.template.config.polling_interval {
            None => DEFAULT_POLLING_INTERVAL,
            Some(value) => match parse_polling_interval(value) {
                Ok(interval) => interval,
                Err(e) => {
                    error!(
                        template_id = self.template_id,
                        error = %e,
                        "unable to parse polling interval, shutting down"
                    );
                    let _ = self.shutdown_tx.send(true);
                    return;
                }
            },
        };

        info!(
            template_id = self.template_id,
            destination = %self.template.destination_path,
            "template engine started"
        );

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let wait = self.tick(polling_interval).await;

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// One poll cycle. Returns how long to sleep before the next one.
    async fn tick(&mut self, polling_interval: Duration) -> Duration {
        self.leases.prune();

        let token = self.tokens.current_token();
        if token.is_empty() {
            return EMPTY_TOKEN_RETRY;
        }

        let source = self.template_source();
        let request = RenderRequest {
            template_id: self.template_id,
            source,
            token,
            previous_etag: self.existing_etag.clone(),
            current_etag: Arc::clone(&self.current_etag),
        };

        match self.renderer.render(request).await {
            Err(e) => {
                error!(template_id = self.template_id, error = %e, "unable to process template");
            }
            Ok(rendered) => {
                let current = self.current_etag.lock().expect("etag slot poisoned").clone();
                if current != self.existing_etag || self.first_run {
                    self.publish(&rendered, current).await;
                }
            }
        }

        // Sleep until whichever comes first: the polling interval or the
        // soonest lease deadline in the system.
        let mut wait = polling_interval;
        if let Some(expiry) = self.leases.earliest_expiry(self.template_id) {
            let until_expiry = (expiry - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if until_expiry < wait {
                wait = until_expiry;
            }
        }
        wait
    }

    async fn publish(&mut self, rendered: &[u8], current_etag: String) {
        let destination = PathBuf::from(&self.template.destination_path);
        match write_artifact(rendered, &destination).await {
            Ok(()) => {
                info!(
                    template_id = self.template_id,
                    destination = %destination.display(),
                    "secret template rendered and saved"
                );
            }
            Err(e) => {
                error!(
                    destination = %destination.display(),
                    error = %e,
                    "unable to write rendered secrets, will try again on next cycle"
                );
            }
        }

        self.existing_etag = current_etag;

        if !self.first_run {
            if let Some(command) = self.template.config.execute.command.clone() {
                info!(template_id = self.template_id, %command, "executing post-render command");
                if let Err(e) =
                    execute_with_timeout(&command, self.template.config.execute.timeout).await
                {
                    error!(template_id = self.template_id, error = %e, "unable to execute command");
                }
            }
        }
        self.first_run = false;
    }

    fn template_source(&self) -> TemplateSource {
        match (&self.template.source_path, &self.template.base64_template_content) {
            (Some(path), _) if !path.is_empty() => TemplateSource::File(PathBuf::from(path)),
            (_, Some(content)) => TemplateSource::Inline(content.clone()),
            // Config validation guarantees one of the two is present.
            _ => TemplateSource::Inline(String::new()),
        }
    }
}
