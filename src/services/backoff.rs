//! Exponential backoff with jitter for the Processor's transient-conflict
//! retry loop (spec §4.1: "initial 100 ms, multiplier 5, max 2 s, cap 3
//! attempts").

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(initial_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_ms,
            max_ms,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based: the delay awaited after
    /// the first failed try, before trying again). Multiplier 5, capped at
    /// `max_ms`, with equal jitter (half fixed, half random) so that many
    /// callers backing off from the same conflict don't retry in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = (self.initial_ms as f64) * 5f64.powi(exponent as i32);
        let capped = raw.min(self.max_ms as f64);
        let jittered = capped / 2.0 + rand::rng().random_range(0.0..capped / 2.0);
        Duration::from_millis(jittered.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_backoff() -> Backoff {
        Backoff::new(100, 2000, 3)
    }

    #[test]
    fn first_attempt_never_exceeds_initial_delay() {
        let b = default_backoff();
        let d = b.delay_for_attempt(1);
        assert!(d.as_millis() <= 100);
    }

    #[test]
    fn delay_grows_with_attempt_and_caps_at_max() {
        let b = default_backoff();
        for attempt in 1..=10 {
            let d = b.delay_for_attempt(attempt);
            assert!(d.as_millis() <= 2000, "attempt {attempt} exceeded cap: {d:?}");
        }
    }

    #[test]
    fn third_attempt_is_near_the_cap() {
        let b = default_backoff();
        // 100 * 5^2 = 2500, capped to 2000; jitter keeps it in [1000, 2000].
        let d = b.delay_for_attempt(3);
        assert!(d.as_millis() >= 1000 && d.as_millis() <= 2000);
    }
}
