//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (global per-caller fixed window)
//!     → Pass to the gateway handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed: a rejected request never reaches an upstream
//! - The inbound limiter is separate from per-target limiters; a request can
//!   be charged by both

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, InboundLimiter, X_CALLER_ID};
