//! Rule Validator capability and declarative rule sets.
//!
//! A [`RuleSet`] maps field names to pipe-separated rule lists such as
//! `"required|string|max:255"`. The [`RuleValidator`] trait checks an
//! extracted JSON object against a rule set; [`LocalRuleEngine`] is the
//! built-in implementation.
//!
//! ## Supported rules (local engine)
//!
//! | Rule | Passes when |
//! |------|-------------|
//! | `required` | field present, not null, not `""`, not `[]` |
//! | `nullable` | (modifier) null/missing skips remaining rules |
//! | `string` / `integer` / `numeric` / `boolean` | JSON type matches |
//! | `array` / `object` | JSON array / JSON object |
//! | `min:n` / `max:n` | size bound: chars, items, keys, or numeric value |
//! | `in:a,b,c` | value (as text) is one of the options |
//! | `email` | string looks like `local@domain.tld` |
//!
//! Dotted field names (`address.city`) address nested objects.

pub mod engine;

pub use engine::LocalRuleEngine;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::attempt::FieldErrors;

/// Custom error messages keyed `"field.rule"` or `"rule"`.
///
/// `:attribute` is replaced with the humanized field name; `:min`, `:max`
/// and `:values` with the rule parameter.
pub type Messages = IndexMap<String, String>;

/// Ordered field → rule-list mapping describing the expected object.
///
/// # Example
///
/// ```
/// use llm_validator::rules::RuleSet;
///
/// let rules = RuleSet::new()
///     .field("name", "required|string")
///     .field("age", "required|integer|min:0");
/// assert_eq!(rules.len(), 2);
/// assert_eq!(rules.get("age"), Some("required|integer|min:0"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    fields: IndexMap<String, String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rules for a field.
    pub fn field(mut self, name: impl Into<String>, rules: impl Into<String>) -> Self {
        self.fields.insert(name.into(), rules.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|s| s.as_str())
    }

    /// Fields and their raw rule strings, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Stable serialization used for cache keys.
    ///
    /// Fields are sorted and each rule list is normalized (segments trimmed,
    /// empties dropped), so insertion order and stray whitespace do not
    /// change the result while any change in rule content does.
    pub fn canonical_json(&self) -> String {
        let sorted: BTreeMap<&str, Vec<&str>> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), split_rules(v).collect()))
            .collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for RuleSet {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Non-empty, trimmed segments of a pipe-separated rule list.
pub(crate) fn split_rules(rules: &str) -> impl Iterator<Item = &str> {
    rules.split('|').map(str::trim).filter(|r| !r.is_empty())
}

/// Outcome of checking one object against a rule set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    /// True when no field produced an error.
    pub passes: bool,
    /// The fields covered by the rules, taken from the input. Empty on failure.
    pub validated: Map<String, Value>,
    /// Errors per field, in rule order.
    pub errors: FieldErrors,
}

impl RuleOutcome {
    pub fn passed(validated: Map<String, Value>) -> Self {
        Self {
            passes: true,
            validated,
            errors: FieldErrors::new(),
        }
    }

    pub fn failed(errors: FieldErrors) -> Self {
        Self {
            passes: false,
            validated: Map::new(),
            errors,
        }
    }
}

/// Capability that checks an extracted object against a rule set.
///
/// Implementations must be safe to share across concurrent validations.
pub trait RuleValidator: Send + Sync {
    fn validate(&self, data: &Map<String, Value>, rules: &RuleSet, messages: &Messages) -> RuleOutcome;
}
