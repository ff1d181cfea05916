//! Token lifecycle manager.
//!
//! Owns the universal-auth access token and drives its lifecycle:
//!
//! 1. initial authentication with the machine identity credentials,
//! 2. periodic renewal while the soft TTL allows it,
//! 3. forced re-authentication once the hard ceiling
//!    (`fetched_at + max_ttl`) nears.
//!
//! Every new token is announced on a single-slot watch channel; subscribers
//! that lag simply coalesce updates and always observe the current token.
//!
//! Timing discipline: a 5 second grace is kept against both expiries — a
//! renewal is never scheduled at or past `fetched_at + max_ttl − 5 s`, and
//! the sleep between renewals never exceeds `ttl − 5 s`.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info};

use crate::api::{ApiClient, TokenGrant};
use crate::config::UniversalAuthConfig;
use crate::errors::{AgentError, Result};
use crate::secrets::SecretString;
use crate::services::retry::RetryPolicy;

/// Environment variable overriding the configured client id path.
pub const CLIENT_ID_ENV: &str = "INFISICAL_UNIVERSAL_AUTH_CLIENT_ID";

/// Environment variable overriding the configured client secret path.
pub const CLIENT_SECRET_ENV: &str = "INFISICAL_UNIVERSAL_CLIENT_SECRET";

/// Margin kept against soft and hard token expiries.
const TOKEN_EXPIRY_GRACE: Duration = Duration::from_secs(5);

/// Wait after a failed authenticate/renew before retrying the lifecycle step.
const FAILURE_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before exiting when `exit_after_auth` is set, giving token sinks
/// and first renders time to flush.
const EXIT_AFTER_AUTH_DELAY: Duration = Duration::from_secs(25);

#[derive(Default)]
struct TokenState {
    token: SecretString,
    ttl: Duration,
    max_ttl: Duration,
    fetched_at: Option<Instant>,
    refreshed_at: Option<Instant>,
}

#[derive(Debug, PartialEq, Eq)]
enum LifecyclePhase {
    /// No token yet: perform the initial authentication
    Initial,
    /// Soft window still open: renew the existing token
    Refresh,
    /// Hard ceiling reached: a full re-authentication is required
    Reauthenticate,
}

/// Owns the access token; all mutation happens under its lock.
pub struct TokenManager {
    api: ApiClient,
    auth: UniversalAuthConfig,
    exit_after_auth: bool,
    state: Mutex<TokenState>,
    /// Client secret from the last successful disk read; enables
    /// `remove_client_secret_on_read`
    cached_client_secret: Mutex<Option<SecretString>>,
    notify_tx: watch::Sender<u64>,
}

impl TokenManager {
    pub fn new(api: ApiClient, auth: UniversalAuthConfig, exit_after_auth: bool) -> Self {
        let (notify_tx, _) = watch::channel(0);
        Self {
            api,
            auth,
            exit_after_auth,
            state: Mutex::new(TokenState::default()),
            cached_client_secret: Mutex::new(None),
            notify_tx,
        }
    }

    /// Subscribe to new-token notifications. The channel carries a
    /// generation counter, not the token itself: read the current token
    /// through [`TokenManager::current_token`] on wake-up.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify_tx.subscribe()
    }

    /// Copy of the current access token; empty before the first
    /// authentication succeeds.
    pub fn current_token(&self) -> SecretString {
        self.state.lock().expect("token state poisoned").token.clone()
    }

    /// Drive the token lifecycle until shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let result = match self.current_phase() {
                LifecyclePhase::Initial => {
                    info!("attempting to authenticate");
                    self.authenticate().await
                }
                LifecyclePhase::Reauthenticate => {
                    info!("token has reached max TTL, re-authenticating");
                    self.authenticate().await
                }
                LifecyclePhase::Refresh => {
                    info!("renewing access token");
                    self.renew().await
                }
            };

            if let Err(e) = result {
                if matches!(e, AgentError::Fatal { .. }) {
                    error!(error = %e, "unrecoverable token lifecycle failure");
                    std::process::exit(1);
                }
                error!(error = %e, "token operation failed, retrying in 30 seconds");
                if sleep_or_shutdown(FAILURE_BACKOFF, &mut shutdown_rx).await {
                    return;
                }
                continue;
            }

            if self.exit_after_auth {
                info!(
                    delay_secs = EXIT_AFTER_AUTH_DELAY.as_secs(),
                    "authentication succeeded, exiting after flush delay"
                );
                tokio::time::sleep(EXIT_AFTER_AUTH_DELAY).await;
                std::process::exit(0);
            }

            if sleep_or_shutdown(self.next_sleep(), &mut shutdown_rx).await {
                return;
            }
        }
    }

    fn current_phase(&self) -> LifecyclePhase {
        let state = self.state.lock().expect("token state poisoned");
        let fetched_at = match state.fetched_at {
            Some(at) => at,
            None => return LifecyclePhase::Initial,
        };

        let hard = fetched_at + state.max_ttl.saturating_sub(TOKEN_EXPIRY_GRACE);
        if Instant::now() >= hard {
            LifecyclePhase::Reauthenticate
        } else {
            LifecyclePhase::Refresh
        }
    }

    fn next_sleep(&self) -> Duration {
        let state = self.state.lock().expect("token state poisoned");
        let refresh_offset = match (state.fetched_at, state.refreshed_at) {
            (Some(fetched), Some(refreshed)) => refreshed.duration_since(fetched),
            _ => Duration::ZERO,
        };
        next_refresh_sleep(state.ttl, state.max_ttl, refresh_offset)
    }

    /// Authenticate with the machine identity, replacing all token state.
    pub async fn authenticate(&self) -> Result<()> {
        let client_id = match std::env::var(CLIENT_ID_ENV) {
            Ok(id) if !id.is_empty() => id,
            _ => tokio::fs::read_to_string(&self.auth.client_id_path).await.map_err(|e| {
                AgentError::credential(format!(
                    "unable to read client id from '{}': {}",
                    self.auth.client_id_path, e
                ))
            })?,
        };

        let client_secret = match std::env::var(CLIENT_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => SecretString::new(secret),
            _ => match tokio::fs::read_to_string(&self.auth.client_secret_path).await {
                Ok(secret) => SecretString::new(secret),
                Err(e) => {
                    // The file may have been unlinked by a prior read with
                    // remove_client_secret_on_read; the cached copy keeps
                    // later re-authentications working.
                    let cached = self.cached_client_secret.lock().expect("secret cache poisoned");
                    cached.clone().ok_or_else(|| {
                        AgentError::credential(format!(
                            "unable to read client secret from '{}' and no cached client secret found: {}",
                            self.auth.client_secret_path, e
                        ))
                    })?
                }
            },
        };

        if self.auth.remove_client_secret_on_read {
            let _ = tokio::fs::remove_file(&self.auth.client_secret_path).await;
        }

        *self.cached_client_secret.lock().expect("secret cache poisoned") =
            Some(client_secret.clone());

        let grant = self.api.login(&client_id, &client_secret).await?;
        ensure_supported_ttl(&grant)?;

        self.install_grant(grant, false);
        info!("authentication succeeded");
        Ok(())
    }

    /// Renew the current token, extending its soft expiry. Transport and
    /// server-side failures are retried per [`RetryPolicy::token_renewal`].
    async fn renew(&self) -> Result<()> {
        let token = self.current_token();
        let grant = RetryPolicy::token_renewal()
            .run("token renewal", || self.api.renew_token(&token))
            .await?;

        self.install_grant(grant, true);
        info!("access token renewed");
        Ok(())
    }

    fn install_grant(&self, grant: TokenGrant, renewed: bool) {
        {
            let mut state = self.state.lock().expect("token state poisoned");
            state.token = grant.access_token;
            state.ttl = grant.ttl;
            state.max_ttl = grant.max_ttl;
            if renewed {
                state.refreshed_at = Some(Instant::now());
            } else {
                state.fetched_at = Some(Instant::now());
                state.refreshed_at = None;
            }
        }

        self.notify_tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    #[cfg(test)]
    pub(crate) fn seed_token_for_tests(&self, token: &str, ttl: Duration, max_ttl: Duration) {
        let mut state = self.state.lock().unwrap();
        state.token = SecretString::new(token);
        state.ttl = ttl;
        state.max_ttl = max_ttl;
        state.fetched_at = Some(Instant::now());
        state.refreshed_at = None;
    }
}

fn ensure_supported_ttl(grant: &TokenGrant) -> Result<()> {
    if grant.ttl <= TOKEN_EXPIRY_GRACE {
        return Err(AgentError::fatal(
            "access tokens with a TTL of 5 seconds or less cannot be kept alive; \
             increase the access token TTL and try again",
        ));
    }
    Ok(())
}

/// How long to sleep after a successful lifecycle step.
///
/// `refresh_offset` is how far after `fetched_at` the latest renewal
/// happened (zero right after an authentication). When the upcoming soft
/// expiry would land past the hard ceiling, the sleep is shortened so the
/// loop wakes at the ceiling and re-authenticates instead of overshooting.
fn next_refresh_sleep(ttl: Duration, max_ttl: Duration, refresh_offset: Duration) -> Duration {
    let next_soft = refresh_offset + ttl.saturating_sub(TOKEN_EXPIRY_GRACE);
    let hard = max_ttl.saturating_sub(TOKEN_EXPIRY_GRACE);

    if next_soft > hard {
        ttl.saturating_sub(next_soft - hard)
    } else {
        ttl.saturating_sub(TOKEN_EXPIRY_GRACE)
    }
}

async fn sleep_or_shutdown(duration: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}
