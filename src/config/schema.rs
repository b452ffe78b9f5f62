//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine
//! and its gateway. All types derive Serde traits for deserialization from
//! config files.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

use crate::resilience::partition::PartitionStrategy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Gateway listener settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Global limiter applied to every inbound request.
    pub inbound_rate_limit: InboundRateLimitConfig,

    /// Policy used by targets without a named policy.
    pub defaults: PolicyConfig,

    /// Named policies, referenced by upstreams.
    pub policies: HashMap<String, PolicyConfig>,

    /// Guarded upstream dependencies.
    pub upstreams: Vec<UpstreamConfig>,
}

impl EngineConfig {
    /// Policy configuration for a target: its named policy, else the defaults.
    pub fn policy_for(&self, target: &str) -> &PolicyConfig {
        self.upstreams
            .iter()
            .find(|u| u.name == target)
            .and_then(|u| u.policy.as_ref())
            .and_then(|name| self.policies.get(name))
            .unwrap_or(&self.defaults)
    }
}

/// Gateway listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for one inbound request, retries included.
    pub request_timeout_secs: u64,

    /// How often expired rate-limit windows are swept. 0 disables sweeping.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            sweep_interval_secs: 300,
        }
    }
}

/// Retry, breaker and limiter settings for one target.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total invocations including the first (at least 1).
    pub max_attempts: u32,

    /// Delay strategy between attempts.
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Constant delay.
    Fixed { delay_ms: u64 },

    /// Doubling delay, capped.
    Exponential {
        base_delay_ms: u64,
        max_delay_ms: u64,
        #[serde(default)]
        jitter: bool,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Fixed { delay_ms: 1000 }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial.
    pub break_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            break_duration_secs: 30,
        }
    }
}

/// Fixed-window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Permits per window. 0 rejects every call.
    pub permit_limit: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// How the partition key is derived.
    pub partition: PartitionStrategy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permit_limit: 10,
            window_secs: 60,
            partition: PartitionStrategy::CallerIdentity,
        }
    }
}

/// Global inbound limiter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InboundRateLimitConfig {
    pub enabled: bool,
    pub permit_limit: u32,
    pub window_secs: u64,
    pub partition: PartitionStrategy,
}

impl Default for InboundRateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            permit_limit: 20,
            window_secs: 60,
            partition: PartitionStrategy::CallerIdentity,
        }
    }
}

impl InboundRateLimitConfig {
    pub fn as_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            permit_limit: self.permit_limit,
            window_secs: self.window_secs,
            partition: self.partition,
        }
    }
}

/// An upstream dependency reachable through the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Target key; also the path segment in `/proxy/{name}/...`.
    pub name: String,

    /// Base URL requests are forwarded to.
    pub base_url: String,

    /// Named policy; falls back to `[defaults]`.
    #[serde(default)]
    pub policy: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
