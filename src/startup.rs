//! Supervisor: boots the agent and runs its main loop.
//!
//! Wires the token lifecycle manager, one template worker per configured
//! template, and the token-sink fan-out together, and owns signal handling.
//! Shutdown propagates through a shared watch channel; an OS signal or a
//! worker-fatal condition terminates the process with status 1.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::api::{ApiClient, ApiConfig, SecretSource};
use crate::config::AgentConfig;
use crate::errors::Result;
use crate::leases::LeaseRegistry;
use crate::services::sink::write_token_to_sinks;
use crate::services::template_worker::TemplateWorker;
use crate::services::token_manager::TokenManager;
use crate::template::TemplateRenderer;

/// Boot the agent from a resolved configuration and run until terminated.
pub async fn run_agent(config: AgentConfig) -> Result<()> {
    let api = ApiClient::new(ApiConfig { base_url: config.api_base_url(), ..Default::default() })?;

    let leases = Arc::new(LeaseRegistry::new());
    let tokens = Arc::new(TokenManager::new(
        api.clone(),
        config.auth.universal_auth.clone(),
        config.infisical.exit_after_auth,
    ));
    let renderer =
        Arc::new(TemplateRenderer::new(Arc::new(api) as Arc<dyn SecretSource>, Arc::clone(&leases)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let mut token_notifications = tokens.subscribe();

    {
        let manager = Arc::clone(&tokens);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { manager.run(shutdown_rx).await });
    }

    for (template_id, template) in config.templates.iter().cloned().enumerate() {
        let worker = TemplateWorker::new(
            template_id,
            template,
            Arc::clone(&renderer),
            Arc::clone(&leases),
            Arc::clone(&tokens),
            Arc::clone(&shutdown_tx),
        );
        tokio::spawn(worker.run(shutdown_rx.clone()));
    }

    let sinks = Arc::new(config.sinks);
    let mut fatal_watch = shutdown_rx;

    loop {
        tokio::select! {
            changed = token_notifications.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                // Publish the fresh token without holding up the main loop.
                let tokens = Arc::clone(&tokens);
                let sinks = Arc::clone(&sinks);
                tokio::spawn(async move {
                    write_token_to_sinks(&tokens.current_token(), &sinks).await;
                });
            }
            _ = shutdown_signal() => {
                info!("agent is gracefully shutting down");
                let _ = shutdown_tx.send(true);
                std::process::exit(1);
            }
            changed = fatal_watch.changed() => {
                if changed.is_ok() && *fatal_watch.borrow() {
                    error!("shutting down after fatal worker error");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Resolves when an interrupt or termination signal arrives.
async fn shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c().await.expect("failed to install interrupt signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install terminate signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
