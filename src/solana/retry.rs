use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorClass, Result};

/// Retry configuration for state-changing RPC calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Per-call bookkeeping, dropped when `execute` returns
struct RetryState {
    attempt: u32,
    last_error: Option<Error>,
    unknown_retried: bool,
}

/// Bounded retry with pure exponential backoff
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff before the attempt following `attempt` (zero based): `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.config.base_delay_ms.saturating_mul(factor))
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    ///
    /// Every invocation of `operation` must rebuild whatever it submits, so a
    /// stale blockhash is replaced rather than resent. Cancellation is checked
    /// around each attempt and during the backoff sleep.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut state = RetryState {
            attempt: 0,
            last_error: None,
            unknown_retried: false,
        };

        loop {
            if let Some(previous) = &state.last_error {
                debug!("{}: attempt {} after {}", label, state.attempt + 1, previous);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = operation() => outcome,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let class = err.class();
            let eligible = match class {
                ErrorClass::Unknown => !state.unknown_retried,
                other => other.is_retryable(),
            };
            let exhausted = state.attempt + 1 >= max_attempts;

            if !eligible || exhausted {
                if eligible {
                    warn!("{}: giving up after {} attempts: {}", label, max_attempts, err);
                }
                return Err(err);
            }

            if class == ErrorClass::Unknown {
                state.unknown_retried = true;
            }

            let delay = self.delay_for(state.attempt);
            warn!(
                "{}: attempt {}/{} failed ({:?}): {}; retrying in {:?}",
                label,
                state.attempt + 1,
                max_attempts,
                class,
                err,
                delay
            );
            state.last_error = Some(err);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            state.attempt += 1;
        }
    }
}

/// A token that cancels itself once `deadline` has elapsed
pub fn cancel_after(deadline: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(deadline) => timer.cancel(),
        }
    });
    token
}
