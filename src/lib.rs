//! Resilience policy engine and guarding HTTP gateway.
//!
//! Calls to a named target pass through a per-partition rate limiter, a
//! per-target circuit breaker and a retry policy, and finish with one
//! distinguishable outcome.

pub mod config;
pub mod http;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::EngineConfig;
pub use http::HttpServer;
pub use resilience::{PolicyError, PolicyExecutor, PolicyRegistry, Retryable};
