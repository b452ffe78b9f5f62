//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (upstreams reference existing policies)
//! - Validate value ranges (attempts ≥ 1, thresholds ≥ 1, windows > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{BackoffConfig, EngineConfig, PolicyConfig};

/// Longest accepted window or break duration: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check the configuration, collecting every problem found.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("server.bind_address", "must be a socket address"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }
    if config.inbound_rate_limit.enabled {
        check_duration("inbound_rate_limit.window_secs", config.inbound_rate_limit.window_secs, &mut errors);
    }

    validate_policy("defaults", &config.defaults, &mut errors);
    let mut names: Vec<_> = config.policies.keys().collect();
    names.sort();
    for name in names {
        validate_policy(&format!("policies.{name}"), &config.policies[name], &mut errors);
    }

    let mut seen = HashSet::new();
    for (i, upstream) in config.upstreams.iter().enumerate() {
        let field = format!("upstreams[{i}]");
        if upstream.name.is_empty() || upstream.name.contains('/') {
            errors.push(ValidationError::new(format!("{field}.name"), "must be non-empty and contain no '/'"));
        } else if !seen.insert(upstream.name.as_str()) {
            errors.push(ValidationError::new(format!("{field}.name"), format!("duplicate upstream `{}`", upstream.name)));
        }
        match Url::parse(&upstream.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(_) => errors.push(ValidationError::new(format!("{field}.base_url"), "scheme must be http or https")),
            Err(e) => errors.push(ValidationError::new(format!("{field}.base_url"), e.to_string())),
        }
        if let Some(policy) = &upstream.policy {
            if !config.policies.contains_key(policy) {
                errors.push(ValidationError::new(format!("{field}.policy"), format!("unknown policy `{policy}`")));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_policy(prefix: &str, policy: &PolicyConfig, errors: &mut Vec<ValidationError>) {
    if policy.retry.max_attempts == 0 {
        errors.push(ValidationError::new(format!("{prefix}.retry.max_attempts"), "must be at least 1"));
    }
    if let BackoffConfig::Exponential { base_delay_ms, max_delay_ms, .. } = policy.retry.backoff {
        if max_delay_ms < base_delay_ms {
            errors.push(ValidationError::new(
                format!("{prefix}.retry.backoff.max_delay_ms"),
                "must not be less than base_delay_ms",
            ));
        }
    }
    if policy.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.circuit_breaker.failure_threshold"),
            "must be at least 1",
        ));
    }
    if policy.circuit_breaker.break_duration_secs > MAX_DURATION_SECS {
        errors.push(ValidationError::new(
            format!("{prefix}.circuit_breaker.break_duration_secs"),
            format!("must be at most {MAX_DURATION_SECS}"),
        ));
    }
    check_duration(&format!("{prefix}.rate_limit.window_secs"), policy.rate_limit.window_secs, errors);
}

fn check_duration(field: &str, secs: u64, errors: &mut Vec<ValidationError>) {
    if secs == 0 {
        errors.push(ValidationError::new(field, "must be greater than 0"));
    } else if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::new(field, format!("must be at most {MAX_DURATION_SECS}")));
    }
}
