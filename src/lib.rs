//! # LLM Validator
//!
//! Validated structured output from LLMs.
//!
//! Send a prompt to a provider, pull the JSON object out of whatever the
//! model wrote, check it against field rules, and on failure re-prompt with
//! the exact errors until the output passes or the attempt budget is spent.
//!
//! ## Core Concepts
//!
//! - **[`StructuredValidator`]**: runs the retry-validate-correct loop.
//!   Cheap to clone, safe to share across tasks.
//! - **[`Schema`]**: rules, messages, system prompt and a cast to the output
//!   type. Use [`RulesSchema`] for a plain JSON map or [`TypedSchema`] to
//!   deserialize into your own struct.
//! - **[`Provider`](backend::Provider)**: one async `send` per attempt.
//!   OpenAI-compatible, Anthropic and Ollama implementations are included,
//!   plus a scripted [`MockProvider`](backend::MockProvider) for tests.
//! - **[`ValidationResult`]**: success flag, cast data, token usage and
//!   the full [`AttemptRecord`] history.
//! - **[`ValidateOptions`]**: per-call provider, attempt limit, model
//!   overrides and cancellation.
//!
//! Malformed output and rule failures never raise: they are attempts in the
//! result. Transport, cast and configuration faults are returned as
//! [`ValidatorError`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_validator::{Config, StructuredValidator, TypedSchema, ValidateOptions};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Person { name: String, age: u32 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("llm_validator.toml")?.with_env_overrides()?;
//!     let validator = StructuredValidator::from_config(&config)?;
//!
//!     let schema = TypedSchema::<Person>::new([
//!         ("name", "required|string"),
//!         ("age", "required|integer|min:0"),
//!     ]);
//!
//!     let person = validator
//!         .validate("Extract the person: John is 30.", &schema, &ValidateOptions::default())
//!         .await?
//!         .into_data()?;
//!     println!("{} is {}", person.name, person.age);
//!     Ok(())
//! }
//! ```

pub mod attempt;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod options;
pub mod prompt;
pub mod result;
pub mod retry;
pub mod rules;
pub mod schema;
pub mod validator;

pub use attempt::{AttemptRecord, FieldErrors, TokenUsage};
pub use backend::{Provider, ProviderRegistry, ProviderResponse, SendOptions};
pub use cache::{CacheStore, MemoryCache};
pub use config::Config;
pub use error::{CastError, Result, ValidatorError};
pub use events::{AttemptEvent, AttemptLogger, TracingLogger};
pub use extract::extract_json;
pub use options::ValidateOptions;
pub use result::ValidationResult;
pub use retry::RetryConfig;
pub use rules::{LocalRuleEngine, RuleSet, RuleValidator};
pub use schema::{RulesSchema, Schema, TypedSchema};
pub use validator::{StructuredValidator, StructuredValidatorBuilder};
