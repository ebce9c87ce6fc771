//! Capped exponential backoff with a bounded attempt counter.
//!
//! Shared by the process supervisor (restart delays) and the connection
//! driver (reconnect delays).

use std::time::Duration;

use crate::config::BackoffConfig;

/// Exponential backoff state
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig, max_attempts: u32) -> Self {
        Self {
            config,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the given attempt (1-based): `initial * multiplier^(attempt-1)`,
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_delay_ms as f64;
        let max = self.config.max_delay_ms.max(self.config.initial_delay_ms);
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let multiplier = if self.config.multiplier < 1.0 {
            1.0
        } else {
            self.config.multiplier
        };

        let raw = initial * multiplier.powi(exponent);
        let millis = if raw.is_finite() && raw < max as f64 {
            raw as u64
        } else {
            max
        };
        Duration::from_millis(millis)
    }

    /// Consume one attempt and return its delay, or `None` when exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.delay_for(self.attempt))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts consumed since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
