//! Redelivery policy for negatively acknowledged deliveries.

use rand::Rng;
use std::time::Duration;

/// How the broker retries a delivery after a nack.
///
/// Delays grow exponentially from `base_delay` and are capped at
/// `max_delay`, with up to `jitter` of the computed delay added on top so
/// that consumers failing in lockstep do not retry in lockstep.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total delivery attempts before the event is parked on the dead
    /// letter topic. The first delivery counts as attempt 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Fraction of the delay to randomize, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

/// What to do with a delivery that was nacked on `attempt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Redeliver after the given delay.
    Retry { delay: Duration },
    /// Attempts are exhausted; park the event.
    GiveUp,
}

impl RetryPolicy {
    /// Decide the fate of a delivery that failed on `attempt` (1-based).
    #[must_use]
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.delay_for(attempt),
        }
    }

    /// Exponential backoff with jitter for a failed `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        if self.jitter <= 0.0 {
            return scaled;
        }
        let spread = scaled.mul_f64(self.jitter.min(1.0));
        let extra = rand::thread_rng().gen_range(Duration::ZERO..=spread);
        (scaled + extra).min(self.max_delay)
    }
}
