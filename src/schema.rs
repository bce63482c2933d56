//! Schema capability: expected shape, system prompt, and cast.
//!
//! A [`Schema`] is supplied per call. It hands the validator a [`RuleSet`]
//! (opaque to the retry loop, interpreted by the [`RuleValidator`](crate::rules::RuleValidator)),
//! optional custom messages, a system prompt, and a `cast` that turns the
//! validated mapping into the caller's type.
//!
//! `cast` must not fail for data that already passed the schema's own rules.
//! When it does, the validator surfaces [`ValidatorError::Cast`](crate::ValidatorError::Cast)
//! instead of a failed result.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;

use crate::error::CastError;
use crate::prompt::default_system_prompt;
use crate::rules::{Messages, RuleSet};

/// Caller-supplied description of the expected output.
///
/// # Example
///
/// ```
/// use llm_validator::schema::Schema;
/// use llm_validator::rules::{Messages, RuleSet};
/// use llm_validator::CastError;
/// use serde_json::{Map, Value};
///
/// struct Person { name: String, age: u32 }
///
/// struct PersonSchema { rules: RuleSet, messages: Messages }
///
/// impl Schema for PersonSchema {
///     type Output = Person;
///
///     fn rules(&self) -> &RuleSet { &self.rules }
///     fn messages(&self) -> &Messages { &self.messages }
///
///     fn cast(&self, data: Map<String, Value>) -> Result<Person, CastError> {
///         Ok(Person {
///             name: data["name"].as_str().unwrap_or_default().to_string(),
///             age: data["age"].as_u64().ok_or_else(|| CastError::new("age"))? as u32,
///         })
///     }
/// }
/// ```
pub trait Schema: Send + Sync {
    /// The application-defined typed value produced on success.
    type Output: Send;

    /// Rules the extracted object must satisfy.
    fn rules(&self) -> &RuleSet;

    /// Custom error messages for the rule validator.
    fn messages(&self) -> &Messages;

    /// System prompt sent with every attempt. Defaults to one derived from
    /// [`rules`](Self::rules).
    fn system_prompt(&self) -> String {
        default_system_prompt(self.rules())
    }

    /// Map validated data into [`Output`](Self::Output). Must be pure.
    fn cast(&self, data: Map<String, Value>) -> Result<Self::Output, CastError>;
}

/// Rules-only schema: default system prompt, identity cast.
///
/// # Example
///
/// ```
/// use llm_validator::schema::{RulesSchema, Schema};
///
/// let schema = RulesSchema::new([("name", "required|string")]);
/// assert!(schema.system_prompt().contains("name: required|string"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RulesSchema {
    rules: RuleSet,
    messages: Messages,
    system_prompt: Option<String>,
}

impl RulesSchema {
    pub fn new(rules: impl Into<RuleSet>) -> Self {
        Self {
            rules: rules.into(),
            ..Self::default()
        }
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }

    /// Replace the derived system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl Schema for RulesSchema {
    type Output = Map<String, Value>;

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn messages(&self) -> &Messages {
        &self.messages
    }

    fn system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(&self.rules))
    }

    fn cast(&self, data: Map<String, Value>) -> Result<Self::Output, CastError> {
        Ok(data)
    }
}

/// Schema whose cast deserializes the validated mapping into `T` with serde.
///
/// A serde failure on rule-conforming data means the rules and `T` disagree;
/// it is reported as a [`CastError`].
///
/// # Example
///
/// ```
/// use llm_validator::schema::{Schema, TypedSchema};
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct Person { name: String, age: u32 }
///
/// let schema = TypedSchema::<Person>::new([("name", "required|string"), ("age", "required|integer")]);
/// let person = schema.cast(json!({"name": "John", "age": 30}).as_object().unwrap().clone()).unwrap();
/// assert_eq!(person.age, 30);
/// ```
pub struct TypedSchema<T> {
    inner: RulesSchema,
    _output: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new(rules: impl Into<RuleSet>) -> Self {
        Self {
            inner: RulesSchema::new(rules),
            _output: PhantomData,
        }
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.inner = self.inner.with_messages(messages);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner = self.inner.with_system_prompt(prompt);
        self
    }
}

impl<T> std::fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedSchema")
            .field("rules", &self.inner.rules)
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned + Send> Schema for TypedSchema<T> {
    type Output = T;

    fn rules(&self) -> &RuleSet {
        self.inner.rules()
    }

    fn messages(&self) -> &Messages {
        self.inner.messages()
    }

    fn system_prompt(&self) -> String {
        self.inner.system_prompt()
    }

    fn cast(&self, data: Map<String, Value>) -> Result<T, CastError> {
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}
