//! HTTP gateway subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → security::rate_limit (global fixed-window limiter, 429)
//!     → server.rs (route, resolve upstream, derive partition)
//!     → PolicyExecutor (limiter → breaker → upstream.rs fetch, retries)
//!     → response.rs (map outcome to status and body)
//!     → Send to client
//! ```

pub mod response;
pub mod server;
pub mod upstream;

pub use server::{shutdown_signal, AppState, HttpServer};
pub use upstream::{Upstream, UpstreamError, UpstreamResponse};
