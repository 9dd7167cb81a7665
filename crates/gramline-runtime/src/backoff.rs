//! Retry delays for the polling loop.
//!
//! | Failure | Delay |
//! |---------|-------|
//! | retry hint (`retry_after`) | hint + up to 10 % of `min(hint, max)` |
//! | network error, 5xx | `initial × multiplier^n` + jitter, capped at `max` |
//!
//! `n` counts consecutive failures and is reset by the loop after a
//! successful poll. A retry hint is never shortened: polling again before it
//! elapses only earns another one. `max` bounds its jitter instead.

use std::time::Duration;

use rand::Rng;

/// Jitter applied on top of a platform retry hint.
pub const RETRY_AFTER_JITTER: f64 = 0.1;

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Upper bound for exponential delays, jitter included. Retry hints may
    /// exceed it.
    pub max: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Random extra delay as a fraction of the base delay.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl Backoff {
    /// Returns the same policy without randomness.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// The delay before jitter after `failures` earlier consecutive failures.
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// The delay to wait after `failures` earlier consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.base_delay(failures);
        add_jitter(base, self.jitter).min(self.max)
    }

    /// The delay to wait for a platform retry hint: at least `hint`.
    pub fn retry_after(&self, hint: Duration) -> Duration {
        let jitter_base = hint.min(self.max);
        let extra = add_jitter(jitter_base, RETRY_AFTER_JITTER).saturating_sub(jitter_base);
        hint.saturating_add(extra)
    }
}

fn add_jitter(base: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 || base.is_zero() {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0.0..=fraction);
    base.saturating_add(base.mul_f64(extra))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Backoff {
        Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let backoff = policy().without_jitter();
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_bounds() {
        let backoff = policy();
        for _ in 0..100 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(220));
        }
    }

    #[test]
    fn test_retry_after_adds_at_most_ten_percent() {
        let backoff = Backoff {
            max: Duration::from_secs(60),
            ..policy()
        };
        for _ in 0..100 {
            let delay = backoff.retry_after(Duration::from_secs(5));
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_millis(5500));
        }
    }

    #[test]
    fn test_retry_after_never_shortens_long_hint() {
        let backoff = policy();
        for _ in 0..100 {
            let delay = backoff.retry_after(Duration::from_secs(30));
            assert!(delay >= Duration::from_secs(30));
            assert!(delay <= Duration::from_millis(30_100));
        }
    }

    #[test]
    fn test_retry_after_huge_hint_saturates() {
        let backoff = policy();
        let hint = Duration::from_secs(u64::MAX);
        assert!(backoff.retry_after(hint) >= hint);
        assert_eq!(backoff.retry_after(Duration::MAX), Duration::MAX);
    }
}
