//! Reconnection delay bookkeeping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff tuning, part of `ClientOptions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffOptions {
    /// Delay before the first retry, in milliseconds.
    pub base_interval_ms: u64,
    /// Growth factor per attempt. Values below 1.0 are treated as 1.0.
    pub decay: f64,
    /// Ceiling for the delay, in milliseconds.
    pub max_interval_ms: u64,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            base_interval_ms: 1_000,
            decay: 1.5,
            max_interval_ms: 30_000,
        }
    }
}

/// Computes `min(max, base * decay^attempts)` and counts attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    options: BackoffOptions,
    attempts: u32,
}

impl Backoff {
    pub fn new(options: BackoffOptions) -> Self {
        Self {
            options,
            attempts: 0,
        }
    }

    /// Attempts made since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay for the upcoming attempt; advances the attempt count.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn delay_for(&self, attempts: u32) -> Duration {
        let decay = self.options.decay.max(1.0);
        let exponent = attempts.min(i32::MAX as u32) as i32;
        let raw = self.options.base_interval_ms as f64 * decay.powi(exponent);
        let capped = raw.min(self.options.max_interval_ms as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
