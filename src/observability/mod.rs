//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience gates and the gateway produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (fmt subscriber, filtered by RUST_LOG or config)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric calls are no-ops until a recorder is installed, so library users
//!   pay nothing unless they opt in
//! - Labels are target names and outcome kinds only; partition keys never
//!   become labels

pub mod logging;
pub mod metrics;
