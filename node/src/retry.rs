//! Exponential backoff for out-of-order retries and resubscription.
//!
//! Each retry doubles the wait interval up to a cap, mirroring how deferred
//! work is rescheduled elsewhere in the node.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Initial wait before the first retry.
pub const INITIAL_INTERVAL_MS: u64 = 250;

/// Maximum wait between retries.
pub const MAX_INTERVAL_MS: u64 = 30_000;

/// Attempts before an out-of-order event forces a resubscription.
pub const MAX_ATTEMPTS: u32 = 8;

/// Backoff policy for events applied before their prerequisite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_ms() -> u64 {
    INITIAL_INTERVAL_MS
}

fn default_multiplier() -> u32 {
    2
}

fn default_max_ms() -> u64 {
    MAX_INTERVAL_MS
}

fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_ms: INITIAL_INTERVAL_MS,
            multiplier: 2,
            max_ms: MAX_INTERVAL_MS,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_ms.saturating_mul(factor).min(self.max_ms))
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_ms, self.multiplier, self.max_ms)
    }
}

/// Stateful doubling interval, reset after a success.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial_ms: u64,
    multiplier: u32,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(initial_ms: u64, multiplier: u32, max_ms: u64) -> Self {
        Self {
            initial_ms,
            multiplier: multiplier.max(1),
            max_ms,
            current_ms: initial_ms.min(max_ms),
        }
    }

    /// The next wait; each call grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.current_ms);
        self.current_ms = self
            .current_ms
            .saturating_mul(u64::from(self.multiplier))
            .min(self.max_ms);
        delay
    }

    pub fn reset(&mut self) {
        self.current_ms = self.initial_ms.min(self.max_ms);
    }
}
