//! Global inbound rate limiting middleware.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::InboundRateLimitConfig;
use crate::resilience::clock::Clock;
use crate::resilience::partition::{CallContext, PartitionStrategy};
use crate::resilience::rate_limit::{Admission, FixedWindowConfig, RateLimiter};

/// Header carrying the authenticated caller name, set by the auth layer in
/// front of the gateway.
pub const X_CALLER_ID: &str = "x-caller-id";

/// Limiter shared by every inbound request.
#[derive(Debug)]
pub struct InboundLimiter {
    limiter: RateLimiter,
    partition: PartitionStrategy,
    clock: Arc<dyn Clock>,
}

impl InboundLimiter {
    pub fn new(config: &InboundRateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter: RateLimiter::new("inbound", FixedWindowConfig::from(&config.as_rate_limit())),
            partition: config.partition,
            clock,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Partition key for a request with these headers from `client_ip`.
    pub fn partition_for(&self, headers: &HeaderMap, client_ip: Option<IpAddr>) -> String {
        self.partition.derive(&CallContext {
            caller: caller_identity(headers),
            client_ip,
            host: header_str(headers, header::HOST.as_str()),
            policy: "inbound",
        })
    }

    fn check(&self, headers: &HeaderMap, client_ip: Option<IpAddr>) -> (String, Admission) {
        let key = self.partition_for(headers, client_ip);
        let admission = self.limiter.try_acquire(&key, self.clock.now());
        (key, admission)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The caller name from [`X_CALLER_ID`], if present.
pub fn caller_identity(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, X_CALLER_ID).filter(|c| !c.is_empty())
}

/// Peer IP of the connection, when served with connect info.
pub fn client_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Rejection response: 429 with the seconds until the window resets.
pub fn too_many_requests(retry_after: Duration) -> Response {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    let mut response = (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
    response
}

/// Middleware function for global inbound rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<Arc<InboundLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_ip = client_ip(&request);
    match state.check(request.headers(), client_ip) {
        (_, Admission::Admitted { .. }) => next.run(request).await,
        (key, Admission::Rejected { retry_after }) => {
            tracing::warn!(client = %key, "Inbound rate limit exceeded");
            too_many_requests(retry_after)
        }
    }
}
