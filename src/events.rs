//! Attempt logging.
//!
//! The validator reports every attempt to an [`AttemptLogger`] right after
//! the attempt record is built, before deciding whether to retry. The
//! default [`TracingLogger`] writes through `tracing`; [`NoopLogger`] drops
//! everything; [`FnLogger`] forwards to a closure.

use serde::Serialize;

use crate::attempt::{AttemptRecord, FieldErrors};
use crate::prompt::truncate_chars;

/// Maximum characters of a raw response carried by an [`AttemptEvent`].
pub const RESPONSE_LOG_LIMIT: usize = 1000;

/// One attempt, as reported to loggers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptEvent {
    pub provider: String,
    pub attempt: u32,
    pub json_valid: bool,
    pub schema_valid: bool,
    pub duration_ms: f64,
    pub total_tokens: u64,
    /// Empty when the attempt passed or had no JSON.
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    pub errors: FieldErrors,
    /// Raw response, cut to [`RESPONSE_LOG_LIMIT`] chars. Only set when
    /// response logging is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl AttemptEvent {
    pub fn from_record(provider: &str, record: &AttemptRecord, include_response: bool) -> Self {
        Self {
            provider: provider.to_string(),
            attempt: record.attempt(),
            json_valid: record.json_valid(),
            schema_valid: record.schema_valid(),
            duration_ms: record.duration_ms(),
            total_tokens: record.usage().total_tokens,
            errors: record.validation_errors().clone(),
            response: include_response
                .then(|| truncate_chars(record.raw_response(), RESPONSE_LOG_LIMIT).to_string()),
        }
    }

    /// Both JSON extraction and rule validation passed.
    pub fn ok(&self) -> bool {
        self.json_valid && self.schema_valid
    }
}

/// Sink for attempt events.
///
/// Must be safe to share across concurrent validations.
///
/// # Example
///
/// ```
/// use llm_validator::events::{AttemptEvent, AttemptLogger};
///
/// struct PrintLogger;
///
/// impl AttemptLogger for PrintLogger {
///     fn record(&self, event: &AttemptEvent) {
///         println!("[{}] attempt {} ok={}", event.provider, event.attempt, event.ok());
///     }
/// }
/// ```
pub trait AttemptLogger: Send + Sync {
    /// Called once per attempt.
    fn record(&self, event: &AttemptEvent);

    /// Called before each send when prompt logging is on.
    fn prompt_sent(&self, _provider: &str, _attempt: u32, _prompt: &str) {}
}

/// Logs through `tracing`: INFO for passing attempts, WARN for failing ones.
///
/// Every event carries a `channel` field so subscribers can route validator
/// output separately.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    channel: String,
}

impl TracingLogger {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new("llm_validator")
    }
}

impl AttemptLogger for TracingLogger {
    fn record(&self, event: &AttemptEvent) {
        let errors = if event.errors.is_empty() {
            None
        } else {
            serde_json::to_string(&event.errors).ok()
        };
        if event.ok() {
            tracing::info!(
                channel = %self.channel,
                provider = %event.provider,
                attempt = event.attempt,
                json_valid = event.json_valid,
                schema_valid = event.schema_valid,
                duration_ms = event.duration_ms,
                total_tokens = event.total_tokens,
                response = event.response.as_deref(),
                "LLM validation attempt succeeded"
            );
        } else {
            tracing::warn!(
                channel = %self.channel,
                provider = %event.provider,
                attempt = event.attempt,
                json_valid = event.json_valid,
                schema_valid = event.schema_valid,
                duration_ms = event.duration_ms,
                total_tokens = event.total_tokens,
                errors = errors.as_deref(),
                response = event.response.as_deref(),
                "LLM validation attempt failed"
            );
        }
    }

    fn prompt_sent(&self, provider: &str, attempt: u32, prompt: &str) {
        tracing::debug!(
            channel = %self.channel,
            provider = %provider,
            attempt,
            prompt = %prompt,
            "LLM validation prompt"
        );
    }
}

/// Discards everything. Used when logging is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl AttemptLogger for NoopLogger {
    fn record(&self, _event: &AttemptEvent) {}
}

/// An [`AttemptLogger`] backed by a closure.
///
/// # Example
///
/// ```
/// use llm_validator::events::{AttemptEvent, FnLogger};
/// use std::sync::Arc;
///
/// let logger = Arc::new(FnLogger(|event: &AttemptEvent| {
///     eprintln!("attempt {} used {} tokens", event.attempt, event.total_tokens);
/// }));
/// ```
pub struct FnLogger<F: Fn(&AttemptEvent) + Send + Sync>(pub F);

impl<F: Fn(&AttemptEvent) + Send + Sync> AttemptLogger for FnLogger<F> {
    fn record(&self, event: &AttemptEvent) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::TokenUsage;
    use serde_json::{json, Map};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn failed_record() -> AttemptRecord {
        let mut errors = FieldErrors::new();
        errors.insert("age".into(), vec!["The age must be an integer.".into()]);
        AttemptRecord::validated(
            2,
            r#"{"age": "thirty"}"#.into(),
            json!({"age": "thirty"}).as_object().cloned().unwrap_or_else(Map::new),
            errors,
            TokenUsage::new(10, 5),
            Duration::from_micros(12_346),
        )
    }

    #[test]
    fn test_event_from_record() {
        let event = AttemptEvent::from_record("openai", &failed_record(), false);
        assert_eq!(event.provider, "openai");
        assert_eq!(event.attempt, 2);
        assert!(event.json_valid);
        assert!(!event.schema_valid);
        assert!(!event.ok());
        assert_eq!(event.total_tokens, 15);
        assert_eq!(event.duration_ms, 12.35);
        assert_eq!(event.errors["age"].len(), 1);
        assert!(event.response.is_none());
    }

    #[test]
    fn test_event_response_truncated() {
        let record = AttemptRecord::invalid_json(
            1,
            "y".repeat(RESPONSE_LOG_LIMIT + 200),
            TokenUsage::default(),
            Duration::ZERO,
        );
        let event = AttemptEvent::from_record("mock", &record, true);
        assert_eq!(event.response.unwrap().len(), RESPONSE_LOG_LIMIT);
    }

    #[test]
    fn test_event_serialization_skips_empty() {
        let record = AttemptRecord::invalid_json(1, "nope".into(), TokenUsage::default(), Duration::ZERO);
        let value = serde_json::to_value(AttemptEvent::from_record("mock", &record, false)).unwrap();
        assert!(value.get("errors").is_none());
        assert!(value.get("response").is_none());
        assert_eq!(value["json_valid"], false);
    }

    #[test]
    fn test_fn_logger() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let logger = FnLogger(move |e: &AttemptEvent| sink.lock().unwrap().push(e.attempt));
        logger.record(&AttemptEvent::from_record("mock", &failed_record(), false));
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_tracing_logger_does_not_panic_without_subscriber() {
        let logger = TracingLogger::new("custom");
        assert_eq!(logger.channel(), "custom");
        logger.record(&AttemptEvent::from_record("mock", &failed_record(), true));
        logger.prompt_sent("mock", 1, "prompt");
        NoopLogger.record(&AttemptEvent::from_record("mock", &failed_record(), true));
    }
}
