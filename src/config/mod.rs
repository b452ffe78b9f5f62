//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → PolicyRegistry / gateway built from it at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; per-key breaker and limiter state is
//!   never rebuilt from it at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::EngineConfig;
pub use schema::{BackoffConfig, CircuitBreakerConfig, PolicyConfig, RateLimitConfig, RetryConfig};
pub use schema::{InboundRateLimitConfig, ObservabilityConfig, ServerConfig, UpstreamConfig};
