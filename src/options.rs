//! Per-call options.
//!
//! [`ValidateOptions`] is an immutable value passed to each
//! [`StructuredValidator::validate`](crate::StructuredValidator::validate)
//! call. Overrides never touch the validator itself, so concurrent calls
//! with different providers or attempt limits cannot interfere.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::SendOptions;
use crate::error::Result;
use crate::ValidatorError;

/// Overrides for one validation call.
///
/// # Example
///
/// ```
/// use llm_validator::ValidateOptions;
///
/// let opts = ValidateOptions::new()
///     .with_provider("anthropic")
///     .with_max_attempts(5)
///     .with_temperature(0.0);
/// assert_eq!(opts.provider.as_deref(), Some("anthropic"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Registry name of the provider; `None` uses the default.
    pub provider: Option<String>,
    /// Replaces the retry config's `max_attempts` (clamped to at least 1).
    pub max_attempts: Option<u32>,
    /// Forwarded to the provider on every attempt.
    pub send: SendOptions,
    /// Checked before each send and after each backoff sleep.
    pub cancellation: Option<Arc<AtomicBool>>,
}

impl ValidateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.send = self.send.with_model(model);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.send = self.send.with_temperature(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.send = self.send.with_max_tokens(max_tokens);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.send = self.send.with_extra(key, value);
        self
    }

    pub fn with_send_options(mut self, send: SendOptions) -> Self {
        self.send = send;
        self
    }

    /// Set the cancellation flag.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ValidatorError::Cancelled)
        } else {
            Ok(())
        }
    }
}
