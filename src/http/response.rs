//! Mapping guarded-call outcomes to client responses.
//!
//! # Responsibilities
//! - Pass successful upstream responses through (status, content type, body)
//! - Map each policy outcome to a distinct status code
//!
//! # Design Decisions
//! - Rate limiting is 429 with `Retry-After`; an open circuit is 503
//! - Exhausted retries surface the last upstream status; transport errors are 502
//! - Bodies are short fixed messages; upstream error bodies are not forwarded

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::upstream::{UpstreamError, UpstreamResponse};
use crate::resilience::outcome::PolicyError;
use crate::security::rate_limit::too_many_requests;

pub const PERMANENT_FAILURE_BODY: &str = "Failed to fetch data from the server.";

fn failure_status(failure: &UpstreamError) -> StatusCode {
    match failure {
        UpstreamError::Status { status } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
        UpstreamError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        UpstreamError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Convert the result of a guarded upstream call into a response.
pub fn outcome_response(result: Result<UpstreamResponse, PolicyError<UpstreamError>>) -> Response {
    match result {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
            let mut response = (status, Body::from(upstream.body)).into_response();
            if let Some(value) = upstream.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        Err(PolicyError::RateLimitExceeded { retry_after, .. }) => too_many_requests(retry_after),
        Err(PolicyError::CircuitOpen { target }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Upstream `{target}` is unavailable. Please try again later."),
        )
            .into_response(),
        Err(PolicyError::RetryExhausted { attempts, last_failure }) => (
            failure_status(&last_failure),
            format!("Failed after {attempts} attempts. Please try again later."),
        )
            .into_response(),
        Err(PolicyError::Permanent(failure)) => (failure_status(&failure), PERMANENT_FAILURE_BODY).into_response(),
    }
}
