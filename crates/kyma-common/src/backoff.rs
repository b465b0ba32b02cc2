//! Exponential backoff with jitter for redelivering failed reconciliations.
//!
//! The reconciler never retries on its own; the dispatcher asks this policy how
//! long to wait before handing a failed identity back to a worker.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use kyma_common::backoff::BackoffConfig;
//!
//! let backoff = BackoffConfig::default();
//! let first = backoff.delay_for(1);
//! assert!(first <= Duration::from_millis(750));
//! ```

use std::time::Duration;

use rand::Rng;

/// Backoff policy for identities whose reconciliation failed transiently.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first redelivery
    pub initial_delay: Duration,
    /// Upper bound for any single delay (before jitter)
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure
    pub backoff_multiplier: f64,
    /// Whether to randomize each delay to 0.5x..1.5x
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Policy with the given bounds and default multiplier and jitter
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Same policy without jitter, for deterministic schedules
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before redelivery after `attempt` consecutive failures (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        let secs = if self.jitter {
            // 0.5x to 1.5x of the capped delay
            base * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            base
        };
        // Out-of-range jittered values fall back to the ceiling
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}
