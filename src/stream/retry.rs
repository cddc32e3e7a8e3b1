//! Retry policy for transient poll failures.
//!
//! The default reproduces the classic behaviour of the Zulip bindings: wait
//! one second and try again, forever. Both the retry count and the growth of
//! the interval can be bounded.

use std::time::Duration;

/// How the poll loop waits between retries of a failed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub interval: Duration,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Multiplier applied per consecutive failure. `1.0` keeps the interval fixed.
    pub backoff_factor: f64,
    /// Cap for the grown interval.
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_retries: None,
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval retries with no cap on the count.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff_factor = factor.max(1.0);
        self.max_interval = max_interval;
        self
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// policy is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if let Some(max) = self.max_retries {
            if attempt > max {
                return None;
            }
        }

        let ceiling = self.max_interval.max(self.interval);
        // `max` also maps NaN and negative factors to 1.0.
        let factor = self.backoff_factor.max(1.0);
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let grown = self.interval.as_secs_f64() * factor.powi(exponent);
        if grown.is_nan() || grown >= ceiling.as_secs_f64() {
            return Some(ceiling);
        }
        Some(Duration::try_from_secs_f64(grown).unwrap_or(ceiling))
    }
}

/// Consecutive-failure counter for one session.
#[derive(Debug, Clone)]
pub(crate) struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Record a failure and return how long to wait, or `None` to give up.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        self.policy.delay_for(self.attempt)
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}
