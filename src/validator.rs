//! The retry-validate-correct loop.
//!
//! Each call runs these steps until an attempt passes or the attempt budget
//! is spent:
//!
//! ```text
//!  SENDING ──► PARSING ──► VALIDATING ──► SUCCEEDED
//!     ▲           │             │
//!     │           └──(no JSON)──┤
//!     │                         ▼
//!     └──── backoff ◄──── RETRYING ──(budget spent)──► EXHAUSTED
//! ```
//!
//! Malformed output and rule failures are data: they end up in the attempt
//! history and, once the budget is spent, in a failed [`ValidationResult`].
//! Provider errors, cast errors, configuration errors and cancellation are
//! returned as `Err` immediately.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::attempt::{AttemptRecord, FieldErrors, TokenUsage};
use crate::backend::{Provider, ProviderRegistry};
use crate::cache::{CacheStore, MemoryCache, ResultCache};
use crate::config::Config;
use crate::error::Result;
use crate::events::{AttemptEvent, AttemptLogger, NoopLogger, TracingLogger};
use crate::extract::extract_json;
use crate::options::ValidateOptions;
use crate::prompt::build_retry_prompt;
use crate::result::ValidationResult;
use crate::retry::RetryConfig;
use crate::rules::{LocalRuleEngine, RuleOutcome, RuleSet, RuleValidator};
use crate::schema::{RulesSchema, Schema};

/// Error key used when a rule validator fails without naming a field.
const UNSPECIFIED_FIELD: &str = "data";

/// Sends prompts, validates the structured output, and re-prompts with
/// corrections until the output passes.
///
/// Cheap to clone and safe to share across tasks. Per-call overrides come in
/// through [`ValidateOptions`]; the validator itself is never mutated by a
/// call.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use llm_validator::backend::MockProvider;
/// use llm_validator::schema::RulesSchema;
/// use llm_validator::{StructuredValidator, ValidateOptions};
///
/// # tokio_test::block_on(async {
/// let validator = StructuredValidator::builder()
///     .provider("mock", Arc::new(MockProvider::fixed(r#"{"name": "John", "age": 30}"#)))
///     .build();
///
/// let schema = RulesSchema::new([("name", "required|string"), ("age", "required|integer")]);
/// let result = validator
///     .validate("Extract: John is 30", &schema, &ValidateOptions::default())
///     .await
///     .unwrap();
/// assert!(result.success());
/// assert_eq!(result.data().unwrap()["age"], 30);
/// # });
/// ```
#[derive(Clone)]
pub struct StructuredValidator {
    registry: ProviderRegistry,
    rule_validator: Arc<dyn RuleValidator>,
    cache: Option<ResultCache>,
    logger: Arc<dyn AttemptLogger>,
    retry: RetryConfig,
    log_prompts: bool,
    log_responses: bool,
}

impl std::fmt::Debug for StructuredValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredValidator")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("log_prompts", &self.log_prompts)
            .field("log_responses", &self.log_responses)
            .finish()
    }
}

/// Everything one call needs, resolved once up front.
struct CallPlan<'a> {
    provider: Arc<dyn Provider>,
    retry: RetryConfig,
    options: &'a ValidateOptions,
}

impl StructuredValidator {
    pub fn builder() -> StructuredValidatorBuilder {
        StructuredValidatorBuilder::default()
    }

    /// Build providers, cache and logger from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::builder()
            .registry(ProviderRegistry::from_config(config)?)
            .retry(config.retry.to_retry_config())
            .log_prompts(config.logging.log_prompts)
            .log_responses(config.logging.log_responses);
        builder = if config.logging.enabled {
            builder.logger(Arc::new(TracingLogger::new(config.logging.channel.clone())))
        } else {
            builder.logger(Arc::new(NoopLogger))
        };
        if config.cache.enabled {
            builder = builder.cache(
                Arc::new(MemoryCache::with_capacity(config.cache.max_entries)),
                config.cache.prefix.clone(),
                config.cache.ttl(),
            );
        }
        Ok(builder.build())
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Retry configuration used when a call supplies none.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Validate with the default retry configuration.
    pub async fn validate<S: Schema>(
        &self,
        prompt: &str,
        schema: &S,
        options: &ValidateOptions,
    ) -> Result<ValidationResult<S::Output>> {
        self.validate_with(prompt, schema, options, self.retry.clone()).await
    }

    /// Validate with an explicit retry configuration.
    ///
    /// `options.max_attempts`, when set, still takes precedence over
    /// `retry.max_attempts`.
    pub async fn validate_with<S: Schema>(
        &self,
        prompt: &str,
        schema: &S,
        options: &ValidateOptions,
        retry: RetryConfig,
    ) -> Result<ValidationResult<S::Output>> {
        let plan = self.plan(options, retry)?;

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lookup(prompt, schema.rules()).await {
                return Ok(hit.try_map(|data| schema.cast(data))?);
            }
        }

        let outcome = self.run(prompt, schema, &plan).await?;
        if !outcome.success() {
            return Ok(outcome.try_map(|data| schema.cast(data))?);
        }

        let raw = self.cache.as_ref().map(|_| outcome.clone());
        let typed = outcome.try_map(|data| schema.cast(data))?;
        if let (Some(cache), Some(raw)) = (&self.cache, raw) {
            cache.store(prompt, schema.rules(), &raw).await;
        }
        Ok(typed)
    }

    /// Rules-only path: identity cast, default system prompt.
    pub async fn validate_rules(
        &self,
        prompt: &str,
        rules: impl Into<RuleSet>,
        options: &ValidateOptions,
    ) -> Result<ValidationResult<Map<String, Value>>> {
        let schema = RulesSchema::new(rules);
        self.validate(prompt, &schema, options).await
    }

    fn plan<'a>(&self, options: &'a ValidateOptions, retry: RetryConfig) -> Result<CallPlan<'a>> {
        let provider = self.registry.resolve(options.provider.as_deref())?;
        let attempts = options.max_attempts.unwrap_or(retry.max_attempts);
        let multiplier = retry.backoff_multiplier;
        let retry = retry.with_max_attempts(attempts).with_multiplier(multiplier);
        Ok(CallPlan {
            provider,
            retry,
            options,
        })
    }

    /// The attempt loop. Returns the validated (uncast) mapping on success.
    async fn run<S: Schema>(
        &self,
        prompt: &str,
        schema: &S,
        plan: &CallPlan<'_>,
    ) -> Result<ValidationResult<Map<String, Value>>> {
        let provider_name = plan.provider.name().to_string();
        let system_prompt = schema.system_prompt();
        let max_attempts = plan.retry.max_attempts;
        let no_errors = FieldErrors::new();

        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(max_attempts as usize);
        let mut current_prompt = prompt.to_string();

        for attempt in 1..=max_attempts {
            plan.options.check_cancelled()?;
            if self.log_prompts {
                self.logger.prompt_sent(&provider_name, attempt, &current_prompt);
            }

            let started = Instant::now();
            let response = plan
                .provider
                .send(&current_prompt, &system_prompt, &plan.options.send)
                .await?;
            let duration = started.elapsed();

            let (record, validated) =
                self.evaluate(attempt, response.text, response.usage, duration, schema);
            self.logger.record(&AttemptEvent::from_record(
                &provider_name,
                &record,
                self.log_responses,
            ));

            if let Some(data) = validated {
                attempts.push(record);
                return Ok(ValidationResult::succeeded(data, attempts));
            }

            if attempt < max_attempts {
                let errors = if plan.retry.include_errors_in_retry {
                    record.validation_errors()
                } else {
                    &no_errors
                };
                current_prompt =
                    build_retry_prompt(prompt, record.raw_response(), record.json_valid(), errors);
                attempts.push(record);
                sleep_before(plan.retry.delay_before(attempt + 1)).await;
            } else {
                attempts.push(record);
            }
        }

        Ok(ValidationResult::exhausted(attempts))
    }

    /// Parse and validate one response. The second value is the validated
    /// mapping when the attempt passed.
    fn evaluate<S: Schema>(
        &self,
        attempt: u32,
        text: String,
        usage: TokenUsage,
        duration: Duration,
        schema: &S,
    ) -> (AttemptRecord, Option<Map<String, Value>>) {
        let parsed = match extract_json(&text) {
            Some(p) => p,
            None => return (AttemptRecord::invalid_json(attempt, text, usage, duration), None),
        };

        let RuleOutcome {
            passes,
            validated,
            mut errors,
        } = self
            .rule_validator
            .validate(&parsed, schema.rules(), schema.messages());

        if passes && errors.is_empty() {
            let record = AttemptRecord::validated(attempt, text, parsed, errors, usage, duration);
            return (record, Some(validated));
        }
        if errors.is_empty() {
            errors.insert(
                UNSPECIFIED_FIELD.to_string(),
                vec!["The data did not pass validation.".to_string()],
            );
        }
        (AttemptRecord::validated(attempt, text, parsed, errors, usage, duration), None)
    }
}

async fn sleep_before(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Builder for [`StructuredValidator`].
///
/// Defaults: [`LocalRuleEngine`], [`TracingLogger`], no cache, and
/// [`RetryConfig::default`].
#[derive(Default)]
pub struct StructuredValidatorBuilder {
    registry: ProviderRegistry,
    rule_validator: Option<Arc<dyn RuleValidator>>,
    cache: Option<ResultCache>,
    logger: Option<Arc<dyn AttemptLogger>>,
    retry: RetryConfig,
    log_prompts: bool,
    log_responses: bool,
}

impl StructuredValidatorBuilder {
    /// Register a provider. The first one registered is the default.
    pub fn provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.registry = self.registry.with_provider(name, provider);
        self
    }

    pub fn default_provider(mut self, name: impl Into<String>) -> Self {
        self.registry = self.registry.with_default(name);
        self
    }

    /// Replace the whole provider registry.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn rule_validator(mut self, validator: Arc<dyn RuleValidator>) -> Self {
        self.rule_validator = Some(validator);
        self
    }

    /// Enable result caching on `store`.
    pub fn cache(mut self, store: Arc<dyn CacheStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some(ResultCache::new(store, prefix, ttl));
        self
    }

    pub fn logger(mut self, logger: Arc<dyn AttemptLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Log each outgoing prompt at DEBUG.
    pub fn log_prompts(mut self, enabled: bool) -> Self {
        self.log_prompts = enabled;
        self
    }

    /// Include (truncated) raw responses in attempt events.
    pub fn log_responses(mut self, enabled: bool) -> Self {
        self.log_responses = enabled;
        self
    }

    pub fn build(self) -> StructuredValidator {
        StructuredValidator {
            registry: self.registry,
            rule_validator: self
                .rule_validator
                .unwrap_or_else(|| Arc::new(LocalRuleEngine)),
            cache: self.cache,
            logger: self
                .logger
                .unwrap_or_else(|| Arc::new(TracingLogger::default())),
            retry: self.retry,
            log_prompts: self.log_prompts,
            log_responses: self.log_responses,
        }
    }
}
