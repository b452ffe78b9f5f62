//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_rate_limited_total` (counter): rejected permits, by limiter
//! - `resilience_circuit_transitions_total` (counter): by target, new state
//! - `resilience_retries_total` (counter): scheduled retries, by target
//! - `resilience_attempts_total` (counter): operation invocations, by target, result
//! - `resilience_calls_total` (counter): finished guarded calls, by target, outcome

use std::net::SocketAddr;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_rate_limited(limiter: &str) {
    metrics::counter!("resilience_rate_limited_total", "limiter" => limiter.to_owned()).increment(1);
}

pub fn record_circuit_transition(target: &str, state: CircuitState) {
    metrics::counter!(
        "resilience_circuit_transitions_total",
        "target" => target.to_owned(),
        "state" => state.to_string()
    )
    .increment(1);
}

pub fn record_retry(target: &str) {
    metrics::counter!("resilience_retries_total", "target" => target.to_owned()).increment(1);
}

pub fn record_attempt(target: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("resilience_attempts_total", "target" => target.to_owned(), "result" => result).increment(1);
}

pub fn record_call(target: &str, outcome: &'static str) {
    metrics::counter!("resilience_calls_total", "target" => target.to_owned(), "outcome" => outcome).increment(1);
}
