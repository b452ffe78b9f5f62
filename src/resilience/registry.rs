//! Per-target policy instances.
//!
//! # Responsibilities
//! - Resolve the configured policy for a target key
//! - Create the target's breaker and limiter lazily on first use
//! - Share one limiter between all targets of a named policy
//! - Keep unrelated targets from sharing any state
//! - Sweep expired limiter windows
//!
//! # Design Decisions
//! - The registry is passed to the executor explicitly; there is no global
//! - Breakers are always per target; limiters are per named policy, or per
//!   target for targets on the defaults or a direct override
//! - Entries live for the process lifetime; only limiter windows are swept,
//!   because a swept window is indistinguishable from one that reset

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use dashmap::DashMap;

use crate::config::{EngineConfig, PolicyConfig};
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::partition::PartitionStrategy;
use crate::resilience::rate_limit::{FixedWindowConfig, RateLimiter};
use crate::resilience::retries::RetryPolicy;

/// Everything that guards calls to one target.
#[derive(Debug)]
pub struct TargetPolicy {
    /// Named policy the target uses, or the target itself when unnamed.
    pub policy_name: String,
    pub retry: RetryPolicy,
    pub breaker: Arc<CircuitBreaker>,
    pub limiter: Arc<RateLimiter>,
    pub partition: PartitionStrategy,
}

/// Where a target's configuration comes from.
enum Resolved<'a> {
    Named(&'a str, &'a PolicyConfig),
    Own(&'a PolicyConfig),
}

/// Named, independently configured policy instances.
#[derive(Debug)]
pub struct PolicyRegistry {
    clock: Arc<dyn Clock>,
    defaults: PolicyConfig,
    overrides: HashMap<String, PolicyConfig>,
    named: HashMap<String, PolicyConfig>,
    assignments: HashMap<String, String>,
    targets: DashMap<String, Arc<TargetPolicy>>,
    shared_limiters: DashMap<String, Arc<RateLimiter>>,
}

impl PolicyRegistry {
    /// Create a registry where every target uses `defaults`.
    pub fn new(defaults: PolicyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            defaults,
            overrides: HashMap::new(),
            named: HashMap::new(),
            assignments: HashMap::new(),
            targets: DashMap::new(),
            shared_limiters: DashMap::new(),
        }
    }

    /// Build a registry from loaded configuration, on the system clock.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new(config.defaults.clone(), Arc::new(SystemClock));
        for (name, policy) in &config.policies {
            registry = registry.with_named_policy(name.clone(), policy.clone());
        }
        for upstream in &config.upstreams {
            if let Some(policy) = &upstream.policy {
                registry = registry.with_target_policy(upstream.name.clone(), policy.clone());
            }
        }
        registry
    }

    /// Use `policy` for `target` alone, instead of the defaults.
    pub fn with_target(mut self, target: impl Into<String>, policy: PolicyConfig) -> Self {
        self.overrides.insert(target.into(), policy);
        self
    }

    /// Register a named policy. Its targets share one rate limiter.
    pub fn with_named_policy(mut self, name: impl Into<String>, policy: PolicyConfig) -> Self {
        self.named.insert(name.into(), policy);
        self
    }

    /// Put `target` under the named policy `policy`.
    pub fn with_target_policy(mut self, target: impl Into<String>, policy: impl Into<String>) -> Self {
        self.assignments.insert(target.into(), policy.into());
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    fn resolve(&self, target: &str) -> Resolved<'_> {
        if let Some(config) = self.overrides.get(target) {
            return Resolved::Own(config);
        }
        match self.assignments.get(target).and_then(|name| self.named.get_key_value(name)) {
            Some((name, config)) => Resolved::Named(name.as_str(), config),
            None => Resolved::Own(&self.defaults),
        }
    }

    fn build(&self, target: &str) -> TargetPolicy {
        let (policy_name, config, limiter) = match self.resolve(target) {
            Resolved::Named(name, config) => {
                let limiter = self
                    .shared_limiters
                    .entry(name.to_owned())
                    .or_insert_with(|| Arc::new(RateLimiter::new(name, FixedWindowConfig::from(&config.rate_limit))));
                (name, config, Arc::clone(limiter.value()))
            }
            Resolved::Own(config) => (
                target,
                config,
                Arc::new(RateLimiter::new(target, FixedWindowConfig::from(&config.rate_limit))),
            ),
        };

        TargetPolicy {
            policy_name: policy_name.to_owned(),
            retry: RetryPolicy::from(&config.retry),
            breaker: Arc::new(CircuitBreaker::new(
                target,
                CircuitBreakerConfig::from(&config.circuit_breaker),
                Arc::clone(&self.clock),
            )),
            limiter,
            partition: config.rate_limit.partition,
        }
    }

    /// The policy instance for `target`, created on first use.
    pub fn policy(&self, target: &str) -> Arc<TargetPolicy> {
        if let Some(existing) = self.targets.get(target) {
            return Arc::clone(existing.value());
        }
        let entry = self.targets.entry(target.to_owned()).or_insert_with(|| {
            tracing::debug!(target_key = %target, "Creating policy state");
            Arc::new(self.build(target))
        });
        Arc::clone(entry.value())
    }

    /// The breaker guarding `target`.
    pub fn breaker(&self, target: &str) -> Arc<CircuitBreaker> {
        Arc::clone(&self.policy(target).breaker)
    }

    /// Number of targets with live state.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Snapshot every breaker, sorted by target.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = self.clock.now();
        let mut snapshots: Vec<_> = self
            .targets
            .iter()
            .map(|entry| entry.value().breaker.snapshot(now))
            .collect();
        snapshots.sort_by(|a, b| a.target.cmp(&b.target));
        snapshots
    }

    /// Drop expired limiter windows across all targets.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut limiters: Vec<_> = self.targets.iter().map(|e| Arc::clone(&e.value().limiter)).collect();
        limiters.sort_by_key(|l| Arc::as_ptr(l) as usize);
        limiters.dedup_by(|a, b| Arc::ptr_eq(a, b));

        let evicted: usize = limiters.iter().map(|l| l.evict_expired(now)).sum();
        if evicted > 0 {
            tracing::debug!(evicted, "Swept expired rate-limit windows");
        }
        evicted
    }
}
