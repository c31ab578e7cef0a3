//! Retry delay policy for transient transport failures.
//!
//! Exponential backoff with optional jitter. The policy only computes
//! delays and limits; which errors qualify for a retry is decided by the
//! caller against [`TransportError::is_transient`](crate::error::TransportError::is_transient).

use std::time::Duration;

/// Delay schedule for re-attempting a failed network call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first re-attempt
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Exponential growth factor between attempts
    pub multiplier: f64,
    /// Spread delays randomly by up to this fraction in either direction,
    /// so synchronized clients don't re-attempt in lockstep
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt ceiling and default delays
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Disable jitter, making delays deterministic
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay to sleep before re-attempt number `attempt` (1-based: the
    /// delay before the second overall attempt is `delay_for(1)`)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            let mut rng = rand::rng();
            let offset: f64 = rand::Rng::random_range(&mut rng, -spread..=spread);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
