//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call (executor.rs):
//!     → registry.rs (per-target policy, created lazily)
//!     → rate_limit.rs (fixed window per partition key)
//!     → circuit_breaker.rs (fail fast while the target is unhealthy)
//!     → operation
//!     → On failure: retries.rs (classify, wait backoff.rs delay, go again)
//! ```
//!
//! # Design Decisions
//! - Outcomes are values (`PolicyError`), never panics or hidden failures
//! - Every piece of mutable state belongs to one key and is only touched
//!   under that key's lock
//! - Time comes from an injected `Clock`; delays are tokio timers

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod executor;
pub mod outcome;
pub mod partition;
pub mod rate_limit;
pub mod registry;
pub mod retries;

pub use backoff::Backoff;
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::PolicyExecutor;
pub use outcome::{PolicyError, Retryable};
pub use partition::{CallContext, PartitionStrategy};
pub use rate_limit::{Admission, FixedWindowConfig, RateLimiter};
pub use registry::{PolicyRegistry, TargetPolicy};
pub use retries::RetryPolicy;
