//! Exponential backoff with jitter, and the attempt-accounting policy that
//! gates the reconnection loop.

use std::time::Duration;

use rand::Rng;

/// Unlimited attempts sentinel (mirrors the design's `-1`).
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: i64,
    pub initial: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
    pub mult: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            enabled: true,
            max_attempts: 60,
            initial: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.10,
            mult: 2.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        ReconnectPolicy {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn aggressive() -> Self {
        ReconnectPolicy {
            enabled: true,
            max_attempts: UNLIMITED,
            initial: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            jitter: 0.2,
            mult: 2.0,
        }
    }

    pub fn conservative() -> Self {
        ReconnectPolicy {
            enabled: true,
            max_attempts: 10,
            initial: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
            mult: 2.0,
        }
    }

    fn clamped_jitter(&self) -> f64 {
        self.jitter.clamp(0.0, 1.0)
    }

    fn clamped_mult(&self) -> f64 {
        self.mult.max(1.0)
    }

    /// Delay before attempt `n` (1-indexed), with jitter drawn from the
    /// thread-local RNG.
    pub fn next_delay(&self, attempt: u64) -> Duration {
        self.next_delay_with(attempt, &mut rand::thread_rng())
    }

    /// As [`Self::next_delay`] but with an explicit RNG, for deterministic
    /// tests.
    pub fn next_delay_with<R: Rng + ?Sized>(&self, attempt: u64, rng: &mut R) -> Duration {
        let mult = self.clamped_mult();
        let jitter = self.clamped_jitter();

        let base = self.initial.as_secs_f64() * mult.powi((attempt.max(1) - 1) as i32);
        let jitter_span = base * jitter;
        let offset = if jitter_span > 0.0 {
            rng.gen_range(-jitter_span..=jitter_span)
        } else {
            0.0
        };

        let delay = (base + offset).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Whether a reconnection loop should attempt `attempt` (1-indexed).
    pub fn should_continue(&self, attempt: u64) -> bool {
        if !self.enabled {
            return false;
        }
        if self.max_attempts < 0 {
            return true;
        }
        (attempt as i64) < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jitter_doubles_each_attempt_until_capped() {
        let policy = ReconnectPolicy {
            enabled: true,
            max_attempts: UNLIMITED,
            initial: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
            mult: 2.0,
        };
        let mut rng = rand::thread_rng();
        assert_eq!(policy.next_delay_with(1, &mut rng), Duration::from_millis(100));
        assert_eq!(policy.next_delay_with(2, &mut rng), Duration::from_millis(200));
        assert_eq!(policy.next_delay_with(3, &mut rng), Duration::from_millis(400));
        assert_eq!(policy.next_delay_with(4, &mut rng), Duration::from_millis(800));
        // attempt 5 would be 1600ms, capped at 1000ms.
        assert_eq!(policy.next_delay_with(5, &mut rng), Duration::from_secs(1));
    }

    #[test]
    fn disabled_never_continues() {
        let policy = ReconnectPolicy::disabled();
        assert!(!policy.should_continue(1));
    }

    #[test]
    fn unlimited_always_continues() {
        let policy = ReconnectPolicy {
            max_attempts: UNLIMITED,
            ..Default::default()
        };
        assert!(policy.should_continue(1_000_000));
    }

    #[test]
    fn bounded_continues_below_max_only() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.should_continue(0));
        assert!(policy.should_continue(2));
        assert!(!policy.should_continue(3));
        assert!(!policy.should_continue(4));
    }

    #[test]
    fn jitter_and_mult_are_clamped() {
        let policy = ReconnectPolicy {
            jitter: 5.0,
            mult: 0.1,
            initial: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            ..ReconnectPolicy::disabled()
        };
        assert_eq!(policy.clamped_jitter(), 1.0);
        assert_eq!(policy.clamped_mult(), 1.0);
    }

    #[test]
    fn presets_have_expected_shape() {
        assert!(!ReconnectPolicy::disabled().enabled);
        assert_eq!(ReconnectPolicy::aggressive().max_attempts, UNLIMITED);
        assert_eq!(ReconnectPolicy::conservative().max_attempts, 10);
    }
}
