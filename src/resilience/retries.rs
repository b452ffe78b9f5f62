//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a failed attempt up to `max_attempts` total invocations
//! - Wait `backoff(attempt)` between attempts without blocking a thread
//! - Stop immediately on success, on a non-retryable failure, or on a gate
//!   rejection
//!
//! # Design Decisions
//! - The policy is immutable and shared; per-call state lives on the stack
//! - Exhaustion is its own outcome carrying the last failure
//! - No lock is held while sleeping; gates are re-evaluated by the next attempt

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::outcome::{AttemptError, PolicyError};

/// Bounded retry with a backoff between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` counts the first invocation; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    pub async fn execute<T, E, Op, Fut, P>(&self, operation: Op, retryable: P) -> Result<T, PolicyError<E>>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let operation = &operation;
        self.run_attempts("", move |_| async move { operation().await.map_err(AttemptError::Failed) }, retryable)
            .await
    }

    /// Drive `attempt` through the retry loop.
    ///
    /// `attempt` receives the 1-based attempt index. A `Rejected` result ends
    /// the loop and is returned unchanged.
    pub(crate) async fn run_attempts<T, E, A, Fut, P>(
        &self,
        target: &str,
        attempt: A,
        retryable: P,
    ) -> Result<T, PolicyError<E>>
    where
        A: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
        P: Fn(&E) -> bool,
    {
        let mut index = 1;
        loop {
            let failure = match attempt(index).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Rejected(rejection)) => return Err(rejection),
                Err(AttemptError::Failed(failure)) => failure,
            };

            if !retryable(&failure) {
                tracing::debug!(target_key = %target, attempt = index, "Non-retryable failure");
                return Err(PolicyError::Permanent(failure));
            }

            if index >= self.max_attempts {
                tracing::warn!(target_key = %target, attempts = index, "Retries exhausted");
                return Err(PolicyError::RetryExhausted {
                    attempts: index,
                    last_failure: failure,
                });
            }

            let delay = self.backoff.delay(index);
            tracing::info!(target_key = %target, attempt = index, delay = ?delay, "Retry attempt");
            metrics::record_retry(target);
            tokio::time::sleep(delay).await;
            index += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Backoff::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Backoff::from(&config.backoff))
    }
}
