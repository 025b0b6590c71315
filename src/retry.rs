use rand::Rng;
use std::time::Duration;

use crate::config::ScraperConfig;
use crate::models::ErrorKind;

/// Bounded exponential backoff with jitter.
///
/// The delay before attempt `n + 1` is `backoff_base * 2^(n-1)` plus a uniform
/// jitter in `[0, jitter_max)`. With `jitter_max <= backoff_base` each delay is
/// strictly longer than the one before it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(2000),
            jitter_max: Duration::from_millis(1000),
        }
    }
}

impl From<&ScraperConfig> for RetryPolicy {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms.max(1)),
            jitter_max: Duration::from_millis(config.jitter_max_ms.min(config.backoff_base_ms.max(1))),
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }

    /// Sleep before the attempt following `attempt` (1-based).
    pub fn delay_after<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.backoff_base.saturating_mul(1u32 << exponent);

        let jitter_ms = self.jitter_max.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..jitter_ms))
        };

        base + jitter
    }

    /// All sleeps for one scrape, in order: `max_attempts - 1` entries.
    pub fn delays<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Duration> {
        (1..self.max_attempts).map(|attempt| self.delay_after(attempt, rng)).collect()
    }
}
