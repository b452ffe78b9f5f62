//! Outcome taxonomy for guarded calls.
//!
//! A guarded call returns `Result<T, PolicyError<E>>`. Every non-success path
//! is a distinct variant; nothing is folded into a generic failure.

use std::time::Duration;
use thiserror::Error;

/// Why a guarded call did not produce a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError<E> {
    /// The partition had no permits left in the current window.
    /// The operation was not invoked and the breaker was not touched.
    #[error("rate limit exceeded for partition `{partition}`")]
    RateLimitExceeded { partition: String, retry_after: Duration },

    /// The breaker for the target is open, or its half-open trial is taken.
    /// The operation was not invoked.
    #[error("circuit open for target `{target}`")]
    CircuitOpen { target: String },

    /// The operation failed in a way the retry predicate does not retry.
    #[error("operation failed: {0}")]
    Permanent(E),

    /// Every permitted attempt failed.
    #[error("failed after {attempts} attempts. Please try again later.")]
    RetryExhausted { attempts: u32, last_failure: E },
}

impl<E> PolicyError<E> {
    /// Returns `true` if a gate refused the call before the operation ran.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. } | Self::CircuitOpen { .. })
    }

    /// The failure produced by the operation, if it ran at all.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Permanent(e) | Self::RetryExhausted { last_failure: e, .. } => Some(e),
            Self::RateLimitExceeded { .. } | Self::CircuitOpen { .. } => None,
        }
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limited",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Permanent(_) => "permanent_failure",
            Self::RetryExhausted { .. } => "retry_exhausted",
        }
    }
}

/// Classifies an operation failure as transient or permanent.
pub trait Retryable {
    /// Returns `true` if another attempt may succeed.
    fn is_retryable(&self) -> bool;
}

/// What a single attempt produced when it did not succeed.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// A gate refused the attempt; ends the call unchanged.
    Rejected(PolicyError<E>),
    /// The operation ran and failed.
    Failed(E),
}
