//! Composition of the policy gates around one logical call.
//!
//! # Data Flow
//! ```text
//! run(target, partition, operation)
//!     → registry (resolve target policy)
//!     → retry loop, for every attempt:
//!         → rate limiter (partition)   rejected → RateLimitExceeded
//!         → circuit breaker (target)   rejected → CircuitOpen
//!         → operation()
//!         → breaker records success/failure
//!     → Ok(value) | Permanent | RetryExhausted
//! ```
//!
//! # Design Decisions
//! - The limiter runs first: shedding load is cheaper than touching breaker state
//! - Gate rejections end the call; they never consume retry budget and never
//!   count as breaker failures
//! - The breaker permit is held across the operation only; dropping the call
//!   future mid-attempt releases it

use std::future::Future;
use std::sync::Arc;

use crate::observability::metrics;
use crate::resilience::outcome::{AttemptError, PolicyError, Retryable};
use crate::resilience::rate_limit::Admission;
use crate::resilience::registry::PolicyRegistry;

/// Runs operations under the policies held by a [`PolicyRegistry`].
#[derive(Debug, Clone)]
pub struct PolicyExecutor {
    registry: Arc<PolicyRegistry>,
}

impl PolicyExecutor {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Run `operation` against `target`, charging `partition`'s rate limit.
    ///
    /// Failures are classified with their [`Retryable`] impl.
    pub async fn run<T, E, Op, Fut>(&self, target: &str, partition: &str, operation: Op) -> Result<T, PolicyError<E>>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        self.run_with(target, partition, operation, E::is_retryable).await
    }

    /// Like [`run`](Self::run), with an explicit retryable predicate.
    pub async fn run_with<T, E, Op, Fut, P>(
        &self,
        target: &str,
        partition: &str,
        operation: Op,
        retryable: P,
    ) -> Result<T, PolicyError<E>>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let policy = self.registry.policy(target);
        let clock = self.registry.clock();
        let gates = &*policy;
        let operation = &operation;

        let attempt = move |index: u32| async move {
            let now = clock.now();

            if let Admission::Rejected { retry_after } = gates.limiter.try_acquire(partition, now) {
                return Err(AttemptError::Rejected(PolicyError::RateLimitExceeded {
                    partition: partition.to_owned(),
                    retry_after,
                }));
            }

            let Some(permit) = gates.breaker.allow(now) else {
                tracing::debug!(target_key = %target, attempt = index, "Circuit open, attempt rejected");
                return Err(AttemptError::Rejected(PolicyError::CircuitOpen {
                    target: target.to_owned(),
                }));
            };

            let result = operation().await;
            permit.record_outcome(result.is_ok(), clock.now());
            metrics::record_attempt(target, result.is_ok());
            result.map_err(AttemptError::Failed)
        };

        let outcome = gates.retry.run_attempts(target, attempt, retryable).await;
        match &outcome {
            Ok(_) => metrics::record_call(target, "success"),
            Err(e) => {
                tracing::debug!(target_key = %target, partition = %partition, outcome = e.kind(), "Guarded call failed");
                metrics::record_call(target, e.kind());
            }
        }
        outcome
    }
}
