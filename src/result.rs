//! Terminal outcome of a validation run.

use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptRecord, FieldErrors, TokenUsage};
use crate::error::{Result, ValidatorError};

/// Summary used when the final attempt contained no JSON object.
pub const INVALID_JSON_SUMMARY: &str = "invalid JSON response from AI";

/// Outcome of one call to [`StructuredValidator::validate`](crate::StructuredValidator::validate).
///
/// Either a success carrying the cast data, or an exhausted run carrying an
/// error summary. Both keep the full attempt history, oldest first. Built only
/// through [`succeeded`](Self::succeeded) and [`exhausted`](Self::exhausted);
/// there are no mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult<T> {
    success: bool,
    data: Option<T>,
    attempts: Vec<AttemptRecord>,
    usage: TokenUsage,
    error_summary: Option<String>,
}

impl<T> ValidationResult<T> {
    /// A successful run whose last attempt produced `data`.
    pub fn succeeded(data: T, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            success: true,
            data: Some(data),
            usage: attempts.iter().map(AttemptRecord::usage).sum(),
            attempts,
            error_summary: None,
        }
    }

    /// A run that used every attempt without producing valid output.
    pub fn exhausted(attempts: Vec<AttemptRecord>) -> Self {
        let summary = match attempts.last() {
            Some(last) if last.json_valid() => format!(
                "schema validation failed: {}",
                serde_json::to_string(last.validation_errors()).unwrap_or_default()
            ),
            _ => INVALID_JSON_SUMMARY.to_string(),
        };
        Self {
            success: false,
            data: None,
            usage: attempts.iter().map(AttemptRecord::usage).sum(),
            attempts,
            error_summary: Some(summary),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// The cast data; `None` for a failed run.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Every attempt made, oldest first.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    /// Field errors of the last attempt (empty on success or invalid JSON).
    pub fn last_errors(&self) -> FieldErrors {
        self.last_attempt()
            .map(|a| a.validation_errors().clone())
            .unwrap_or_default()
    }

    /// Token usage summed across every attempt, failed ones included.
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Present only when `success()` is false.
    pub fn error_summary(&self) -> Option<&str> {
        self.error_summary.as_deref()
    }

    /// "Data or fail": the data on success, otherwise
    /// [`ValidatorError::Exhausted`] with the last field errors and the history.
    pub fn into_data(self) -> Result<T> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => {
                let errors = self
                    .attempts
                    .last()
                    .map(|a| a.validation_errors().clone())
                    .unwrap_or_default();
                Err(ValidatorError::Exhausted {
                    summary: self
                        .error_summary
                        .unwrap_or_else(|| INVALID_JSON_SUMMARY.to_string()),
                    errors,
                    attempts: self.attempts,
                })
            }
        }
    }

    /// Convert the data with a fallible function, keeping the history intact.
    pub fn try_map<U, E>(
        self,
        f: impl FnOnce(T) -> std::result::Result<U, E>,
    ) -> std::result::Result<ValidationResult<U>, E> {
        let data = match self.data {
            Some(d) => Some(f(d)?),
            None => None,
        };
        Ok(ValidationResult {
            success: self.success,
            data,
            attempts: self.attempts,
            usage: self.usage,
            error_summary: self.error_summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use std::time::Duration;

    fn parsed(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn bad_json(n: u32, tokens: u64) -> AttemptRecord {
        AttemptRecord::invalid_json(n, "oops".into(), TokenUsage::new(tokens, 1), Duration::ZERO)
    }

    fn schema_fail(n: u32) -> AttemptRecord {
        let mut errors = FieldErrors::new();
        errors.insert("age".into(), vec!["The age must be an integer.".into()]);
        AttemptRecord::validated(
            n,
            "{\"age\": \"x\"}".into(),
            parsed(json!({"age": "x"})),
            errors,
            TokenUsage::new(7, 3),
            Duration::ZERO,
        )
    }

    fn pass(n: u32) -> AttemptRecord {
        AttemptRecord::validated(
            n,
            "{\"age\": 30}".into(),
            parsed(json!({"age": 30})),
            FieldErrors::new(),
            TokenUsage::new(8, 4),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_succeeded_sums_usage_of_all_attempts() {
        let r = ValidationResult::succeeded(30, vec![bad_json(1, 5), schema_fail(2), pass(3)]);
        assert!(r.success());
        assert_eq!(r.data(), Some(&30));
        assert_eq!(r.attempt_count(), 3);
        assert_eq!(r.usage(), TokenUsage::new(5 + 7 + 8, 1 + 3 + 4));
        assert!(r.error_summary().is_none());
    }

    #[test]
    fn test_exhausted_invalid_json_summary() {
        let r: ValidationResult<()> = ValidationResult::exhausted(vec![bad_json(1, 1), bad_json(2, 1)]);
        assert!(!r.success());
        assert!(r.data().is_none());
        assert_eq!(r.error_summary(), Some(INVALID_JSON_SUMMARY));
    }

    #[test]
    fn test_exhausted_schema_summary_uses_last_attempt() {
        let r: ValidationResult<()> = ValidationResult::exhausted(vec![bad_json(1, 1), schema_fail(2)]);
        let summary = r.error_summary().unwrap();
        assert!(summary.starts_with("schema validation failed: "));
        assert!(summary.contains("The age must be an integer."));
        assert_eq!(r.last_errors().len(), 1);
    }

    #[test]
    fn test_into_data_success() {
        let r = ValidationResult::succeeded("ok", vec![pass(1)]);
        assert_eq!(r.into_data().unwrap(), "ok");
    }

    #[test]
    fn test_into_data_failure_carries_history() {
        let r: ValidationResult<()> = ValidationResult::exhausted(vec![bad_json(1, 1), schema_fail(2)]);
        match r.into_data() {
            Err(ValidatorError::Exhausted {
                summary,
                errors,
                attempts,
            }) => {
                assert!(summary.starts_with("schema validation failed"));
                assert_eq!(errors["age"], vec!["The age must be an integer.".to_string()]);
                assert_eq!(attempts.len(), 2);
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_try_map_keeps_history() {
        let r = ValidationResult::succeeded(30u32, vec![bad_json(1, 2), pass(2)]);
        let mapped: ValidationResult<String> = r.try_map(|n| Ok::<_, ()>(n.to_string())).unwrap();
        assert_eq!(mapped.data().map(String::as_str), Some("30"));
        assert_eq!(mapped.attempt_count(), 2);
    }

    #[test]
    fn test_serde_round_trip_for_cache() {
        let r = ValidationResult::succeeded(parsed(json!({"age": 30})), vec![pass(1)]);
        let value = serde_json::to_value(&r).unwrap();
        let back: ValidationResult<Map<String, Value>> = serde_json::from_value(value).unwrap();
        assert_eq!(back, r);
    }
}
