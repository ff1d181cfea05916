//! Retry with exponential backoff.
//!
//! Used by token renewal, which the agent retries very aggressively: the
//! token is the one credential everything else depends on.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{AgentError, Result};

/// Retry configuration with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// The policy applied to token renewal calls: effectively infinite
    /// (10 000 attempts), 5 s base wait, 20 s cap.
    pub fn token_renewal() -> Self {
        Self {
            max_attempts: 10_000,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(20),
            backoff_multiplier: 2.0,
        }
    }

    /// Run `operation` until it succeeds, it fails with a non-retryable
    /// error, or `max_attempts` is exhausted.
    pub async fn run<T, F, Fut>(&self, description: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_delay;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(description, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) if attempt == self.max_attempts => {
                    warn!(description, attempt, %error, "retries exhausted");
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        description,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "operation failed, retrying"
                    );
                    sleep(delay).await;
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * self.backoff_multiplier)
                            .min(self.max_delay.as_secs_f64()),
                    );
                }
            }
        }

        // max_attempts is at least 1, so the loop always returns.
        Err(AgentError::command(format!("{}: no attempts configured", description)))
    }
}
