//! Configuration surface: providers, retry, cache, logging.
//!
//! Every section deserializes with defaults, so an empty file is a valid
//! configuration. Sources, lowest precedence first:
//!
//! 1. [`Config::default`]
//! 2. a TOML file ([`Config::load`], [`Config::from_toml_str`]) or YAML with
//!    the `yaml` feature
//! 3. `LLM_VALIDATOR_*` environment variables ([`Config::with_env_overrides`])
//!
//! ```toml
//! default_provider = "openai"
//!
//! [providers.openai]
//! api_key = "sk-..."
//! model = "gpt-4o-mini"
//!
//! [providers.local]
//! driver = "ollama"
//! model = "llama3.2:3b"
//!
//! [retry]
//! max_attempts = 3
//! backoff_ms = 500
//! backoff_multiplier = 2.0
//!
//! [cache]
//! enabled = true
//! ttl = 3600
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::redact;
use crate::error::Result;
use crate::retry::RetryConfig;
use crate::ValidatorError;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "LLM_VALIDATOR_";

/// Service a provider entry talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderDriver {
    Openai,
    Anthropic,
    Ollama,
}

impl ProviderDriver {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Openai => "https://api.openai.com",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Openai => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Ollama => "llama3.2",
        }
    }

    /// Conventional environment variable holding the API key, if any.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl FromStr for ProviderDriver {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ValidatorError::InvalidConfig(format!(
                "unknown provider driver '{}'",
                other
            ))),
        }
    }
}

/// One `[providers.<name>]` entry.
///
/// When `driver` is omitted the entry name must itself be a driver name.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub driver: Option<ProviderDriver>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Transport retries for 429/5xx and connection errors. 0 disables.
    pub transport_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            driver: None,
            api_key: None,
            base_url: None,
            model: None,
            temperature: 0.0,
            max_tokens: 1024,
            timeout_secs: 60,
            transport_retries: 0,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("driver", &self.driver)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("transport_retries", &self.transport_retries)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(driver: ProviderDriver) -> Self {
        Self {
            driver: Some(driver),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Driver for the entry registered under `name`.
    pub fn driver_for(&self, name: &str) -> Result<ProviderDriver> {
        match self.driver {
            Some(d) => Ok(d),
            None => name.parse().map_err(|_| {
                ValidatorError::InvalidConfig(format!(
                    "provider '{}' has no driver and its name is not a known driver",
                    name
                ))
            }),
        }
    }

    /// Configured model or the driver's default.
    pub fn model_or_default(&self, driver: ProviderDriver) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| driver.default_model().to_string())
    }

    /// Configured base URL or the driver's default.
    pub fn base_url_or_default(&self, driver: ProviderDriver) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| driver.default_base_url().to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub include_errors_in_retry: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            backoff_multiplier: 2.0,
            include_errors_in_retry: true,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        let config = RetryConfig::new(self.max_attempts)
            .with_initial_backoff(Duration::from_millis(self.backoff_ms))
            .with_multiplier(self.backoff_multiplier);
        if self.include_errors_in_retry {
            config
        } else {
            config.without_errors_in_retry()
        }
    }
}

/// `[cache]` section. `ttl` is in seconds; `max_entries` bounds the
/// in-memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub store: String,
    pub ttl: u64,
    pub prefix: String,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            store: "memory".into(),
            ttl: 3600,
            prefix: "llm_validator:".into(),
            max_entries: crate::cache::DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// `[logging]` section. `channel` is attached to every attempt event as a
/// `channel` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub enabled: bool,
    pub channel: String,
    pub log_prompts: bool,
    pub log_responses: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "llm_validator".into(),
            log_prompts: false,
            log_responses: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider used when a call names none. Falls back to the first entry.
    pub default_provider: Option<String>,
    pub providers: IndexMap<String, ProviderConfig>,
    pub retry: RetrySettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ValidatorError::Config(format!("invalid TOML: {}", e)))
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| ValidatorError::Config(format!("invalid YAML: {}", e)))
    }

    /// Load from a file, picking the format from the extension.
    ///
    /// `.toml` always; `.yaml` / `.yml` with the `yaml` feature.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ValidatorError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Self::from_toml_str(&contents),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Self::from_yaml_str(&contents),
            other => Err(ValidatorError::Config(format!(
                "unsupported config format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Overlay `LLM_VALIDATOR_*` variables from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `LLM_VALIDATOR_DEFAULT_PROVIDER` | `default_provider` |
    /// | `LLM_VALIDATOR_MAX_ATTEMPTS` | `retry.max_attempts` |
    /// | `LLM_VALIDATOR_BACKOFF_MS` | `retry.backoff_ms` |
    /// | `LLM_VALIDATOR_BACKOFF_MULTIPLIER` | `retry.backoff_multiplier` |
    /// | `LLM_VALIDATOR_INCLUDE_ERRORS_IN_RETRY` | `retry.include_errors_in_retry` |
    /// | `LLM_VALIDATOR_CACHE_ENABLED` | `cache.enabled` |
    /// | `LLM_VALIDATOR_CACHE_TTL` | `cache.ttl` |
    /// | `LLM_VALIDATOR_CACHE_PREFIX` | `cache.prefix` |
    /// | `LLM_VALIDATOR_LOGGING_ENABLED` | `logging.enabled` |
    /// | `LLM_VALIDATOR_LOG_PROMPTS` | `logging.log_prompts` |
    /// | `LLM_VALIDATOR_LOG_RESPONSES` | `logging.log_responses` |
    ///
    /// Providers without an `api_key` pick up `OPENAI_API_KEY` /
    /// `ANTHROPIC_API_KEY` according to their driver.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an
    /// explicit variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("DEFAULT_PROVIDER") {
            self.default_provider = Some(v);
        }
        if let Some(v) = var("MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_var("MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("BACKOFF_MS") {
            self.retry.backoff_ms = parse_var("BACKOFF_MS", &v)?;
        }
        if let Some(v) = var("BACKOFF_MULTIPLIER") {
            self.retry.backoff_multiplier = parse_var("BACKOFF_MULTIPLIER", &v)?;
        }
        if let Some(v) = var("INCLUDE_ERRORS_IN_RETRY") {
            self.retry.include_errors_in_retry = parse_var("INCLUDE_ERRORS_IN_RETRY", &v)?;
        }
        if let Some(v) = var("CACHE_ENABLED") {
            self.cache.enabled = parse_var("CACHE_ENABLED", &v)?;
        }
        if let Some(v) = var("CACHE_TTL") {
            self.cache.ttl = parse_var("CACHE_TTL", &v)?;
        }
        if let Some(v) = var("CACHE_PREFIX") {
            self.cache.prefix = v;
        }
        if let Some(v) = var("LOGGING_ENABLED") {
            self.logging.enabled = parse_var("LOGGING_ENABLED", &v)?;
        }
        if let Some(v) = var("LOG_PROMPTS") {
            self.logging.log_prompts = parse_var("LOG_PROMPTS", &v)?;
        }
        if let Some(v) = var("LOG_RESPONSES") {
            self.logging.log_responses = parse_var("LOG_RESPONSES", &v)?;
        }

        for (name, provider) in self.providers.iter_mut() {
            if provider.api_key.is_some() {
                continue;
            }
            let env_key = provider
                .driver_for(name)
                .ok()
                .and_then(ProviderDriver::api_key_env);
            if let Some(key) = env_key.and_then(|k| lookup(k)) {
                provider.api_key = Some(key);
            }
        }

        Ok(self)
    }

    /// Reject values the validator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ValidatorError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ValidatorError::InvalidConfig(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                multiplier
            )));
        }
        if let Some(name) = &self.default_provider {
            if !self.providers.contains_key(name) {
                return Err(ValidatorError::InvalidConfig(format!(
                    "default_provider '{}' is not configured",
                    name
                )));
            }
        }
        for (name, provider) in &self.providers {
            provider.driver_for(name)?;
        }
        if self.cache.enabled && self.cache.store != "memory" {
            return Err(ValidatorError::InvalidConfig(format!(
                "unsupported cache store '{}'",
                self.cache.store
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ValidatorError::InvalidConfig(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value))
    })
}
