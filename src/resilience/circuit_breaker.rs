//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: dependency assumed down, attempts fail fast
//! - Half-Open: exactly one trial attempt is in flight
//!
//! # State Transitions
//! ```text
//! Closed → Open:      consecutive_failures reaches failure_threshold
//! Open → Half-Open:   first allow() at or after opened_at + break_duration
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open:   trial fails, or the trial permit is dropped unresolved
//! ```
//!
//! # Design Decisions
//! - Per-target breaker (not global)
//! - Open → Half-Open is evaluated lazily on allow(), never by a timer task
//! - The caller whose allow() performs Open → Half-Open owns the trial; every
//!   other caller is rejected until that trial resolves
//! - All transitions happen under one mutex per breaker, never across an await

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use serde::Serialize;

use crate::config::CircuitBreakerConfig as CircuitBreakerSettings;
use crate::observability::metrics;
use crate::resilience::clock::Clock;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (at least 1).
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial is allowed.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            break_duration: Duration::from_secs(30),
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            break_duration: Duration::from_secs(settings.break_duration_secs),
        }
    }
}

struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub target: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Time left before a trial is allowed, while open.
    pub open_for_ms: Option<u64>,
}

/// Thread-safe circuit breaker for a single target.
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    /// Create a new breaker in `Closed` state.
    ///
    /// `clock` is consulted only when a permit is dropped without an outcome.
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            target: target.into(),
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            clock,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. Does not perform the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.lock().opened_at
    }

    /// Ask to run one attempt at `now`.
    ///
    /// Returns `None` while open, or while another caller holds the
    /// half-open trial.
    pub fn allow(self: &Arc<Self>, now: Instant) -> Option<CircuitPermit> {
        let mut inner = self.lock();
        let state = inner.state;
        let trial = match state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => return None,
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                if now.saturating_duration_since(opened_at) < self.config.break_duration {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.opened_at = None;
                drop(inner);
                tracing::info!(target_key = %self.target, "Circuit breaker → half-open");
                metrics::record_circuit_transition(&self.target, CircuitState::HalfOpen);
                true
            }
        };

        Some(CircuitPermit {
            breaker: Arc::clone(self),
            trial,
            resolved: false,
        })
    }

    fn on_outcome(&self, trial: bool, success: bool, now: Instant) {
        let mut inner = self.lock();
        let transition = match (inner.state, trial, success) {
            (CircuitState::HalfOpen, true, true) => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                Some(CircuitState::Closed)
            }
            (CircuitState::HalfOpen, true, false) => {
                inner.state = CircuitState::Open;
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                inner.opened_at = Some(now);
                Some(CircuitState::Open)
            }
            (CircuitState::Closed, false, true) => {
                inner.consecutive_failures = 0;
                None
            }
            (CircuitState::Closed, false, false) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    Some(CircuitState::Open)
                } else {
                    None
                }
            }
            // Permits granted before the circuit opened do not move it.
            _ => None,
        };
        let failures = inner.consecutive_failures;
        drop(inner);

        match transition {
            Some(CircuitState::Open) if trial => {
                tracing::warn!(target_key = %self.target, "Circuit breaker trial failed → open");
            }
            Some(CircuitState::Open) => {
                tracing::warn!(target_key = %self.target, failures, "Circuit breaker → open");
            }
            Some(CircuitState::Closed) => {
                tracing::info!(target_key = %self.target, "Circuit breaker → closed");
            }
            _ => {}
        }
        if let Some(state) = transition {
            metrics::record_circuit_transition(&self.target, state);
        }
    }

    /// Release a trial that ended without an outcome: back to Open with a
    /// fresh break timer, not counted as a failure.
    fn on_abandoned(&self, trial: bool, now: Instant) {
        if !trial {
            return;
        }
        let mut inner = self.lock();
        if inner.state != CircuitState::HalfOpen {
            return;
        }
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        drop(inner);

        tracing::info!(target_key = %self.target, "Circuit breaker trial cancelled → open");
        metrics::record_circuit_transition(&self.target, CircuitState::Open);
    }

    /// Point-in-time view for inspection endpoints.
    pub fn snapshot(&self, now: Instant) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            target: self.target.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_ms: inner.opened_at.map(|opened| {
                let left = self.config.break_duration.saturating_sub(now.saturating_duration_since(opened));
                u64::try_from(left.as_millis()).unwrap_or(u64::MAX)
            }),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

/// Right to run one attempt against a breaker's target.
///
/// Resolve it with [`CircuitPermit::record_outcome`]. Dropping it unresolved
/// releases a half-open trial without counting it.
#[derive(Debug)]
pub struct CircuitPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    resolved: bool,
}

impl CircuitPermit {
    /// Whether this permit is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Report the result of the permitted attempt.
    pub fn record_outcome(mut self, success: bool, now: Instant) {
        self.resolved = true;
        self.breaker.on_outcome(self.trial, success, now);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.resolved {
            let now = self.breaker.clock.now();
            self.breaker.on_abandoned(self.trial, now);
        }
    }
}
