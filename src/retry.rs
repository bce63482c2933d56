//! Corrective retry configuration.
//!
//! [`RetryConfig`] bounds how many times the validator re-prompts a model
//! after malformed or rule-violating output, and how long it waits between
//! attempts. The delay before attempt `n` (n ≥ 2) is
//! `initial_backoff * backoff_multiplier^(n - 2)`, i.e. the wait that follows
//! failed attempt `n - 1`. Attempt 1 is never delayed.

use std::time::Duration;

/// Configuration for the validate-and-correct loop.
///
/// # Example
///
/// ```
/// use llm_validator::retry::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::new(3)
///     .with_initial_backoff(Duration::from_millis(500))
///     .with_multiplier(2.0);
///
/// assert_eq!(config.delay_before(1), Duration::ZERO);
/// assert_eq!(config.delay_before(2), Duration::from_millis(500));
/// assert_eq!(config.delay_before(3), Duration::from_millis(1000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first send. `0` runs as `1`.
    pub max_attempts: u32,

    /// Wait after the first failed attempt. Default: 500ms.
    pub initial_backoff: Duration,

    /// Growth factor per further attempt. Default: 2.0.
    ///
    /// Use [`with_multiplier`](Self::with_multiplier) to keep it at or above
    /// 1.0; the validator clamps it the same way before each call.
    pub backoff_multiplier: f64,

    /// Whether field errors are listed in the correction prompt. Default: `true`.
    pub include_errors_in_retry: bool,
}

impl RetryConfig {
    /// Up to `max_attempts` sends in total. `0` is treated as `1`.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// A single send and no retry.
    pub fn once() -> Self {
        Self::new(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the multiplier. Values below 1.0 (and NaN) are clamped to 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier >= 1.0 { multiplier } else { 1.0 };
        self
    }

    /// Omit field errors from correction prompts.
    pub fn without_errors_in_retry(mut self) -> Self {
        self.include_errors_in_retry = false;
        self
    }

    /// Wait before the 1-based `attempt`. Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exp);
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Every wait the loop may take, in order (one per retry).
    pub fn schedule(&self) -> Vec<Duration> {
        (2..=self.max_attempts).map(|a| self.delay_before(a)).collect()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            include_errors_in_retry: true,
        }
    }
}
