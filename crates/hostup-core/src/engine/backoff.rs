//! Retry delay computation
//!
//! Delays grow as `initial * 2^attempt`, never exceed `max`, and get a
//! uniform jitter in `[0, jitter]` added on top so many clients behind the
//! same outage do not retry in lockstep.

use rand::Rng;
use std::time::Duration;

use crate::config::EngineConfig;

/// Exponential backoff with capped growth and additive jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    jitter: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            jitter,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.initial_backoff(), config.max_backoff(), config.jitter())
    }

    /// Delay before retry number `attempt` (0-based), without jitter
    ///
    /// A provider-supplied `retry_after` raises the delay but never past `max`.
    pub fn base_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let exponential = self.initial.saturating_mul(factor);
        let delay = match retry_after {
            Some(hint) => exponential.max(hint),
            None => exponential,
        };
        delay.min(self.max)
    }

    /// Delay before retry number `attempt` (0-based), jitter included
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        self.base_delay(attempt, retry_after)
            .saturating_add(self.sample_jitter())
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
