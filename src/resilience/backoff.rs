//! Delay strategies between retry attempts.

use std::time::Duration;
use rand::Rng;

use crate::config::BackoffConfig;

/// Maps a 1-based attempt index to the delay before the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`, optionally with 0-10% jitter.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed(delay)
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential { base, max, jitter: false }
    }

    /// Delay to wait after the `attempt`-th failure.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max, jitter } => {
                calculate_backoff(attempt, base, max, jitter)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_secs(1))
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        match *config {
            BackoffConfig::Fixed { delay_ms } => Backoff::Fixed(Duration::from_millis(delay_ms)),
            BackoffConfig::Exponential { base_delay_ms, max_delay_ms, jitter } => {
                Backoff::Exponential {
                    base: Duration::from_millis(base_delay_ms),
                    max: Duration::from_millis(max_delay_ms),
                    jitter,
                }
            }
        }
    }
}

/// Calculate exponential backoff delay with optional jitter.
fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter: bool) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Jitter stays within 0 to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter_ms = if jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter_ms)
}
