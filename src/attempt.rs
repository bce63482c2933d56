//! Per-attempt records of the send/parse/validate cycle.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Field name to ordered error messages, in the order the rule validator
/// reported them.
pub type FieldErrors = IndexMap<String, Vec<String>>;

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build usage from prompt and completion counts; the total is their sum.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

impl<'a> Sum<&'a TokenUsage> for TokenUsage {
    fn sum<I: Iterator<Item = &'a TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |acc, u| acc + *u)
    }
}

/// Immutable record of one loop iteration.
///
/// Created once per attempt by the validator and never changed afterwards.
/// Only accessors are public.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    attempt: u32,
    raw_response: String,
    parsed: Option<Map<String, Value>>,
    json_valid: bool,
    schema_valid: bool,
    validation_errors: FieldErrors,
    usage: TokenUsage,
    duration: Duration,
}

impl AttemptRecord {
    /// Record an attempt whose text contained no JSON object.
    pub(crate) fn invalid_json(
        attempt: u32,
        raw_response: String,
        usage: TokenUsage,
        duration: Duration,
    ) -> Self {
        Self {
            attempt,
            raw_response,
            parsed: None,
            json_valid: false,
            schema_valid: false,
            validation_errors: FieldErrors::new(),
            usage,
            duration,
        }
    }

    /// Record an attempt whose JSON was extracted and run through the rules.
    pub(crate) fn validated(
        attempt: u32,
        raw_response: String,
        parsed: Map<String, Value>,
        validation_errors: FieldErrors,
        usage: TokenUsage,
        duration: Duration,
    ) -> Self {
        Self {
            attempt,
            raw_response,
            parsed: Some(parsed),
            json_valid: true,
            schema_valid: validation_errors.is_empty(),
            validation_errors,
            usage,
            duration,
        }
    }

    /// 1-based attempt index.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn raw_response(&self) -> &str {
        &self.raw_response
    }

    /// The extracted object, when the response contained one.
    pub fn parsed(&self) -> Option<&Map<String, Value>> {
        self.parsed.as_ref()
    }

    pub fn json_valid(&self) -> bool {
        self.json_valid
    }

    pub fn schema_valid(&self) -> bool {
        self.schema_valid
    }

    /// Did this attempt produce valid, rule-conforming output?
    pub fn ok(&self) -> bool {
        self.json_valid && self.schema_valid
    }

    pub fn validation_errors(&self) -> &FieldErrors {
        &self.validation_errors
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Wall-clock duration in milliseconds, rounded to 2 decimals.
    pub fn duration_ms(&self) -> f64 {
        (self.duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
    }
}
