//! Reconnect delay strategies.
//!
//! A [`ReconnectPolicy`] maps a zero-based attempt index to the delay before
//! that attempt, or `None` to stop reconnecting. The socket driver owns the
//! attempt counter and resets it after every successful open.

use std::time::Duration;

/// Strategy deciding how long to wait before the next reconnect attempt.
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before attempt `attempt` (0 for the first retry), or `None` to give up.
    fn delay(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff: `min(max_delay, base_delay * 2^attempt)`, plus up to
/// `jitter_factor` of random extra delay.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound before jitter.
    pub max_delay: Duration,
    /// Fraction (0.0-1.0) of the capped delay added as random jitter.
    pub jitter_factor: f64,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }
}

impl ExponentialBackoff {
    /// The capped delay without jitter.
    pub fn base_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(31);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }
        let capped = self.base_for(attempt);
        if self.jitter_factor <= 0.0 {
            return Some(capped);
        }
        let jitter = capped.mul_f64(self.jitter_factor.min(1.0) * rand::random::<f64>());
        Some(capped + jitter)
    }
}

/// Constant delay between attempts. Mostly useful in tests.
#[derive(Clone, Debug)]
pub struct FixedDelay(pub Duration);

impl ReconnectPolicy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Option<Duration> {
        Some(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }

    #[test]
    fn doubles_each_attempt() {
        let policy = backoff();
        assert_eq!(policy.delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay(3), Some(Duration::from_millis(800)));
    }

    #[test]
    fn caps_at_max_delay() {
        let policy = backoff();
        assert_eq!(policy.delay(4), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay(40), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = ExponentialBackoff {
            max_attempts: Some(2),
            ..backoff()
        };
        assert!(policy.delay(1).is_some());
        assert!(policy.delay(2).is_none());
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = ExponentialBackoff {
            jitter_factor: 0.5,
            ..backoff()
        };
        for _ in 0..100 {
            let d = policy.delay(1).unwrap();
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(300));
        }
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = FixedDelay(Duration::from_millis(5));
        assert_eq!(policy.delay(0), policy.delay(99));
    }
}
