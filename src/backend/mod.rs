//! Provider capability and the built-in provider implementations.
//!
//! The [`Provider`] trait is the only thing the validator needs from an LLM
//! service: send a prompt with a system prompt, get text and token usage
//! back. Built-in implementations: [`OpenAiProvider`], [`AnthropicProvider`],
//! [`OllamaProvider`], plus [`MockProvider`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! StructuredValidator ──► ProviderRegistry::resolve(name) ──► Provider::send()
//!                                                                 │
//!                           ┌─────────────────────┬───────────────┴─────┐
//!                     OpenAiProvider      AnthropicProvider      OllamaProvider
//!                 /v1/chat/completions       /v1/messages           /api/chat
//! ```
//!
//! Transport failures are returned as errors and are never retried by the
//! validator. Wrap a provider in [`RetryingProvider`] to retry them.

pub mod anthropic;
pub mod backoff;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use backoff::{BackoffConfig, RetryingProvider};
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::attempt::TokenUsage;
use crate::config::{Config, ProviderConfig, ProviderDriver};
use crate::error::Result;
use crate::ValidatorError;

/// Per-call overrides forwarded to the provider.
///
/// Unset fields fall back to the provider's configured defaults. `extra`
/// entries are merged into the provider request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub extra: Map<String, Value>,
}

impl SendOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Add a provider-specific body field (e.g. `top_p`).
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Text and token usage returned by one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Abstraction over LLM services.
///
/// Implementations must be safe for concurrent use; the validator shares
/// them across calls as `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one prompt and return the raw text.
    async fn send(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<ProviderResponse>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Named set of providers; resolution by name happens once per call.
///
/// The first registered provider becomes the default unless
/// [`with_default`](Self::with_default) says otherwise.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, Arc<dyn Provider>>,
    default: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`.
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.providers.insert(name, provider);
        self
    }

    /// Choose the provider used when a call names none.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(|k| k.as_str())
    }

    /// Look up `name`, or the default when `None`.
    ///
    /// An unknown name is a configuration error, never a retry condition.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn Provider>> {
        let name = match name.or(self.default.as_deref()) {
            Some(n) => n,
            None => return Err(ValidatorError::InvalidConfig("no providers registered".into())),
        };
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ValidatorError::UnknownProvider(name.to_string()))
    }

    /// Build one provider per `[providers.<name>]` entry.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for (name, provider_config) in &config.providers {
            let provider = build_provider(name, provider_config)?;
            registry = registry.with_provider(name.clone(), provider);
        }
        if let Some(name) = &config.default_provider {
            registry = registry.with_default(name.clone());
        }
        Ok(registry)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

fn build_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let driver = config.driver_for(name)?;
    let provider: Arc<dyn Provider> = match driver {
        ProviderDriver::Openai => Arc::new(OpenAiProvider::from_config(name, config)?),
        ProviderDriver::Anthropic => Arc::new(AnthropicProvider::from_config(name, config)?),
        ProviderDriver::Ollama => Arc::new(OllamaProvider::from_config(name, config)?),
    };
    if config.transport_retries == 0 {
        return Ok(provider);
    }
    let backoff = BackoffConfig::standard().with_max_retries(config.transport_retries);
    Ok(Arc::new(RetryingProvider::new(provider, backoff)))
}

/// HTTP client with the configured request timeout.
pub(crate) fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .build()?)
}

/// Turn a non-success response into [`ValidatorError::HttpError`].
pub(crate) async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();
    Err(ValidatorError::HttpError {
        status,
        body,
        retry_after,
    })
}

/// Parse a `Retry-After` header value as seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Merge `extra` into a JSON request body, overwriting existing keys.
pub(crate) fn merge_extra(body: &mut Value, extra: &Map<String, Value>) {
    if let Some(obj) = body.as_object_mut() {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
}

/// Read a token count from a response field, treating absence as zero.
pub(crate) fn count(value: &Value, path: &[&str]) -> u64 {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Strip known provider path suffixes from a base URL.
/// This prevents double-pathing when providers append their own paths.
/// e.g., "https://api.openai.com/v1" -> "https://api.openai.com"
/// e.g., "http://localhost:11434/api" -> "http://localhost:11434"
pub(crate) fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    // longest first
    for suffix in &[
        "/v1/chat/completions",
        "/v1/messages",
        "/v1/chat",
        "/v1",
        "/api/chat",
        "/api",
    ] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

/// Redact an API key for `Debug` output, keeping a short prefix.
pub(crate) fn redact(key: &Option<String>) -> Option<String> {
    key.as_ref().map(|k| {
        if k.chars().count() > 6 {
            format!("{}***", k.chars().take(6).collect::<String>())
        } else {
            "***".to_string()
        }
    })
}
