//! Transport-level retry with exponential backoff and jitter.
//!
//! [`BackoffConfig`] controls how transient HTTP errors (429, 5xx) and
//! connection failures are retried. [`RetryingProvider`] applies it around
//! any [`Provider`]. This sits below the validation loop: a retried transport
//! failure never produces an attempt record.
//!
//! Enabled per provider with `transport_retries` in the configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Provider, ProviderResponse, SendOptions};
use crate::error::Result;
use crate::ValidatorError;

/// Transport retry policy for [`RetryingProvider`].
///
/// Delay before retry `n` (0-indexed) is `initial_delay * multiplier^n`,
/// capped at `max_delay`, then jittered. A `Retry-After` hint from the
/// provider replaces the computed delay when `respect_retry_after` is set.
///
/// # Example
///
/// ```
/// use llm_validator::backend::BackoffConfig;
///
/// assert_eq!(BackoffConfig::none().max_retries, 0);
/// assert_eq!(BackoffConfig::standard().with_max_retries(5).max_retries, 5);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Retries after the first failed send. `0` disables retry.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Upper bound for a single computed delay.
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
    /// HTTP statuses treated as transient.
    pub retryable_statuses: Vec<u16>,
    pub respect_retry_after: bool,
}

/// How much randomness is added to a computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Exactly the computed delay.
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// 3 retries, 1s initial delay doubling up to 60s, full jitter, retry on
    /// 429 and 5xx gateway errors, honour `Retry-After`.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computed delay before retry `retry` (0-indexed), jitter applied.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let secs = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Whether `error` is a transient transport failure worth retrying.
    pub fn is_retryable(&self, error: &ValidatorError) -> bool {
        match error {
            ValidatorError::HttpError { status, .. } => self.retryable_statuses.contains(status),
            ValidatorError::Request(_) => true,
            _ => false,
        }
    }

    /// Delay before retry `retry` given the error that caused it.
    fn delay_after(&self, retry: u32, error: &ValidatorError) -> Duration {
        match error {
            ValidatorError::HttpError {
                retry_after: Some(ra),
                ..
            } if self.respect_retry_after => *ra,
            _ => self.delay_for_attempt(retry),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}

/// Wraps a provider with transport-level retry.
///
/// Retries only errors [`BackoffConfig::is_retryable`] accepts; everything
/// else, and the last error once retries run out, is returned unchanged.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use llm_validator::backend::{BackoffConfig, OpenAiProvider, RetryingProvider};
///
/// let provider = RetryingProvider::new(
///     Arc::new(OpenAiProvider::new("gpt-4o-mini")),
///     BackoffConfig::standard(),
/// );
/// ```
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    config: BackoffConfig,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, config: BackoffConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

impl std::fmt::Debug for RetryingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingProvider")
            .field("inner", &self.inner.name())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    async fn send(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<ProviderResponse> {
        let mut retry = 0;
        loop {
            match self.inner.send(prompt, system_prompt, options).await {
                Ok(response) => return Ok(response),
                Err(e) if retry < self.config.max_retries && self.config.is_retryable(&e) => {
                    let delay = self.config.delay_after(retry, &e);
                    retry += 1;
                    tracing::warn!(
                        provider = self.inner.name(),
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transport error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockProvider, MockReply};

    fn no_jitter(max_retries: u32) -> BackoffConfig {
        BackoffConfig::standard()
            .with_max_retries(max_retries)
            .with_jitter(JitterStrategy::None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_provider_recovers_from_503() {
        let mock = Arc::new(MockProvider::from_replies(vec![
            MockReply::Status(503),
            MockReply::Status(429),
            "{}".into(),
        ]));
        let provider = RetryingProvider::new(mock.clone(), no_jitter(3));

        let start = tokio::time::Instant::now();
        let resp = provider.send("p", "", &SendOptions::default()).await.unwrap();
        assert_eq!(resp.text, "{}");
        assert_eq!(mock.calls(), 3);
        // 1s + 2s
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_provider_gives_up() {
        let mock = Arc::new(MockProvider::from_replies(vec![MockReply::Status(500)]));
        let provider = RetryingProvider::new(mock.clone(), no_jitter(2));
        let err = provider.send("p", "", &SendOptions::default()).await.unwrap_err();
        assert!(matches!(err, ValidatorError::HttpError { status: 500, .. }));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_retrying_provider_skips_non_retryable() {
        let mock = Arc::new(MockProvider::from_replies(vec![MockReply::Status(401), "{}".into()]));
        let provider = RetryingProvider::new(mock.clone(), no_jitter(3));
        let err = provider.send("p", "", &SendOptions::default()).await.unwrap_err();
        assert!(matches!(err, ValidatorError::HttpError { status: 401, .. }));
        assert_eq!(mock.calls(), 1);
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_retry_after_respected() {
        let config = no_jitter(3);
        let err = ValidatorError::HttpError {
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(config.delay_after(0, &err), Duration::from_secs(7));
        let config = BackoffConfig {
            respect_retry_after: false,
            ..config
        };
        assert_eq!(config.delay_after(0, &err), Duration::from_secs(1));
    }

    #[test]
    fn test_is_retryable() {
        let config = BackoffConfig::standard();
        let http = |status| ValidatorError::HttpError {
            status,
            body: String::new(),
            retry_after: None,
        };
        assert!(config.is_retryable(&http(429)));
        assert!(config.is_retryable(&http(502)));
        assert!(!config.is_retryable(&http(400)));
        assert!(!config.is_retryable(&ValidatorError::UnknownProvider("x".into())));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = BackoffConfig {
            max_delay: Duration::from_secs(5),
            ..no_jitter(10)
        };
        let delays: Vec<u64> = (0..5).map(|r| config.delay_for_attempt(r).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        assert_eq!(config.delay_for_attempt(30), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_bounds() {
        let full = BackoffConfig::standard();
        let equal = BackoffConfig::standard().with_jitter(JitterStrategy::Equal);
        for _ in 0..100 {
            assert!(full.delay_for_attempt(1) <= Duration::from_secs(2));
            let d = equal.delay_for_attempt(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2));
        }
    }
}
