use std::time::Duration;
use thiserror::Error;

use crate::attempt::{AttemptRecord, FieldErrors};

/// Errors produced by the validator and its collaborators.
///
/// Only transport faults, cast faults, configuration problems and
/// cancellation leave [`StructuredValidator::validate`](crate::StructuredValidator::validate)
/// as `Err`. Malformed output and schema violations are returned as data in
/// a [`ValidationResult`](crate::ValidationResult).
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON (de)serialization failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Provider`](crate::backend::Provider) implementations when
    /// the service answers with a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The provider answered but the payload could not be understood.
    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    /// A provider name that is not present in the registry.
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed.
    #[error("config load failed: {0}")]
    Config(String),

    /// The schema's cast step rejected data that already passed validation.
    #[error("cast failed: {0}")]
    Cast(#[from] CastError),

    /// All attempts were used without producing valid output.
    ///
    /// Only produced by [`ValidationResult::into_data`](crate::ValidationResult::into_data).
    #[error("{summary} (after {} attempts)", attempts.len())]
    Exhausted {
        summary: String,
        /// Field errors of the last attempt (empty when its JSON was invalid).
        errors: FieldErrors,
        /// Full attempt history, oldest first.
        attempts: Vec<AttemptRecord>,
    },

    /// The call was cancelled via the cancellation flag.
    #[error("validation was cancelled")]
    Cancelled,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl ValidatorError {
    /// True for faults of the provider transport (network, auth, rate limit).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ValidatorError::Request(_)
                | ValidatorError::HttpError { .. }
                | ValidatorError::Provider { .. }
        )
    }

    /// True when a schema's cast rejected validated data.
    pub fn is_cast(&self) -> bool {
        matches!(self, ValidatorError::Cast(_))
    }
}

impl From<anyhow::Error> for ValidatorError {
    fn from(err: anyhow::Error) -> Self {
        ValidatorError::Other(err.to_string())
    }
}

/// Error returned by [`Schema::cast`](crate::schema::Schema::cast).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CastError {
    message: String,
}

impl CastError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for CastError {
    fn from(err: serde_json::Error) -> Self {
        CastError::new(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ValidatorError>;
