//! # Retry interval policy.
//!
//! [`BackoffPolicy`] turns an attempt number into the delay a retry loop sleeps before the
//! next attempt. The delay for attempt `n` is `first × factor^n`, capped at `max`, then
//! jittered. Each attempt derives its base from `n` alone, so jitter never accumulates.
//!
//! Retry handlers default to a constant interval; exponential growth is opt-in.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use flowvisor::{BackoffPolicy, JitterPolicy};
//!
//! let constant = BackoffPolicy::constant(Duration::from_secs(5));
//! assert_eq!(constant.next(0), Duration::from_secs(5));
//! assert_eq!(constant.next(7), Duration::from_secs(5));
//!
//! let growing = BackoffPolicy::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(1));
//! assert_eq!(growing.next(1), Duration::from_millis(200));
//! assert_eq!(growing.next(10), Duration::from_secs(1));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry interval policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth per attempt (`1.0` = constant).
    pub factor: f64,
    /// Randomization applied to the capped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 10 minute interval, no jitter.
    fn default() -> Self {
        Self::constant(Duration::from_secs(600))
    }
}

impl BackoffPolicy {
    /// Same delay for every attempt.
    pub fn constant(interval: Duration) -> Self {
        Self {
            first: interval,
            max: interval,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// `first × factor^attempt`, capped at `max`.
    pub fn exponential(first: Duration, factor: f64, max: Duration) -> Self {
        Self {
            first,
            max,
            factor,
            jitter: JitterPolicy::None,
        }
    }

    /// Replaces the jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait before attempt number `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_constant_ten_minutes() {
        let policy = BackoffPolicy::default();
        for attempt in [0, 1, 50] {
            assert_eq!(policy.next(attempt), Duration::from_secs(600));
        }
    }

    #[test]
    fn exponential_grows_then_caps() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(1));
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(4), Duration::from_secs(1));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn first_larger_than_max_is_capped() {
        let policy =
            BackoffPolicy::exponential(Duration::from_secs(10), 2.0, Duration::from_secs(5));
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn equal_jitter_stays_within_half_and_base() {
        let policy = BackoffPolicy::constant(Duration::from_millis(1000))
            .with_jitter(JitterPolicy::Equal);
        for attempt in 0..50 {
            let delay = policy.next(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }
}
