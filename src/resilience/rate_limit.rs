//! Fixed-window rate limiting, partitioned by key.
//!
//! # Responsibilities
//! - Admit at most `permit_limit` units of work per partition per window
//! - Reset a partition's window lazily when a request arrives after it ends
//! - Sweep windows that have already ended
//!
//! # Design Decisions
//! - No queueing: an exhausted window rejects immediately
//! - The window check and the counter increment happen under the partition's
//!   map entry lock, so two callers can never both take the last permit
//! - A window opens at the first request after the previous one ended, not on
//!   a wall-clock boundary

use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Result of asking for a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Permit granted; `remaining` permits are left in this window.
    Admitted { remaining: u32 },
    /// No permits left; the window resets after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Window settings shared by every partition of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowConfig {
    /// Permits per window. Zero rejects everything.
    pub permit_limit: u32,
    /// Length of one window.
    pub window: Duration,
}

impl Default for FixedWindowConfig {
    fn default() -> Self {
        Self {
            permit_limit: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl From<&RateLimitConfig> for FixedWindowConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            permit_limit: config.permit_limit,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

/// Counter state for one partition.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    used: u32,
}

impl Window {
    fn new(start: Instant) -> Self {
        Self { start, used: 0 }
    }

    /// `None` when the window outlasts the clock's range; it never ends.
    fn end(&self, length: Duration) -> Option<Instant> {
        self.start.checked_add(length)
    }

    fn expired(&self, length: Duration, now: Instant) -> bool {
        self.end(length).is_some_and(|end| now >= end)
    }

    fn try_acquire(&mut self, config: &FixedWindowConfig, now: Instant) -> Admission {
        if self.expired(config.window, now) {
            self.start = now;
            self.used = 0;
        }

        if self.used < config.permit_limit {
            self.used += 1;
            Admission::Admitted {
                remaining: config.permit_limit - self.used,
            }
        } else {
            Admission::Rejected {
                retry_after: self
                    .end(config.window)
                    .map_or(config.window, |end| end.saturating_duration_since(now)),
            }
        }
    }
}

/// Fixed-window limiter holding one window per partition key.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: FixedWindowConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    /// Create a limiter; `name` is only used for logs and metrics.
    pub fn new(name: impl Into<String>, config: FixedWindowConfig) -> Self {
        Self {
            name: name.into(),
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &FixedWindowConfig {
        &self.config
    }

    /// Try to take one permit for `partition` at `now`.
    pub fn try_acquire(&self, partition: &str, now: Instant) -> Admission {
        let admission = match self.windows.get_mut(partition) {
            Some(mut window) => window.try_acquire(&self.config, now),
            None => self
                .windows
                .entry(partition.to_owned())
                .or_insert_with(|| Window::new(now))
                .try_acquire(&self.config, now),
        };

        if let Admission::Rejected { retry_after } = admission {
            tracing::debug!(
                limiter = %self.name,
                partition = %partition,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(&self.name);
        }
        admission
    }

    /// Permits already used by `partition` in its current window.
    pub fn permits_used(&self, partition: &str, now: Instant) -> u32 {
        self.windows
            .get(partition)
            .filter(|w| !w.expired(self.config.window, now))
            .map(|w| w.used)
            .unwrap_or(0)
    }

    /// Number of partitions currently tracked.
    pub fn partitions(&self) -> usize {
        self.windows.len()
    }

    /// Drop partitions whose window has ended; returns how many were removed.
    ///
    /// The next request for a removed partition starts a fresh window, which
    /// is what it would have done anyway.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let window = self.config.window;
        self.windows.retain(|_, w| !w.expired(window, now));
        before.saturating_sub(self.windows.len())
    }
}
