//! Provider for OpenAI-compatible chat APIs.
//!
//! Covers OpenAI itself plus anything speaking `/v1/chat/completions`:
//! vLLM, llama.cpp server, LM Studio, Together AI, Groq, Mistral, and
//! Ollama's `/v1/` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{count, error_for_status, http_client, merge_extra, normalize_base_url, redact};
use super::{Provider, ProviderResponse, SendOptions};
use crate::attempt::TokenUsage;
use crate::config::{ProviderConfig, ProviderDriver};
use crate::error::Result;

/// Provider for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use llm_validator::backend::OpenAiProvider;
///
/// let provider = OpenAiProvider::new("gpt-4o-mini").with_api_key("sk-...");
/// ```
#[derive(Clone)]
pub struct OpenAiProvider {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    /// Sent as `Authorization: Bearer {key}` when set.
    api_key: Option<String>,
    /// Sent as `OpenAI-Organization: {org}` when set.
    organization: Option<String>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("organization", &self.organization)
            .finish()
    }
}

impl OpenAiProvider {
    /// Provider against the public OpenAI endpoint, without authentication.
    pub fn new(model: impl Into<String>) -> Self {
        let defaults = ProviderConfig::default();
        Self {
            name: "openai".into(),
            client: Client::new(),
            base_url: ProviderDriver::Openai.default_base_url().into(),
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            api_key: None,
            organization: None,
        }
    }

    /// Build from a `[providers.<name>]` entry.
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self> {
        let driver = ProviderDriver::Openai;
        Ok(Self {
            name: name.to_string(),
            client: http_client(config)?,
            base_url: normalize_base_url(&config.base_url_or_default(driver)),
            model: config.model_or_default(driver),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key: config.api_key.clone(),
            organization: None,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(&url.into());
        self
    }

    /// Use a preconfigured HTTP client (proxies, custom timeouts).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(&self, prompt: &str, system_prompt: &str, options: &SendOptions) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": options.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
        });
        merge_extra(&mut body, &options.extra);
        body
    }

    fn build_http_request(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self.client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }
        req
    }

    fn parse_response(json_resp: &Value) -> ProviderResponse {
        let text = json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let prompt_tokens = count(json_resp, &["usage", "prompt_tokens"]);
        let completion_tokens = count(json_resp, &["usage", "completion_tokens"]);
        let mut usage = TokenUsage::new(prompt_tokens, completion_tokens);
        let reported_total = count(json_resp, &["usage", "total_tokens"]);
        if reported_total > 0 {
            usage.total_tokens = reported_total;
        }
        ProviderResponse { text, usage }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn send(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<ProviderResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_body(prompt, system_prompt, options);

        let resp = self.build_http_request(&url, &body).send().await?;
        let resp = error_for_status(resp).await?;
        let json_resp: Value = resp.json().await?;

        Ok(Self::parse_response(&json_resp))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_chat_payload() {
        let provider = OpenAiProvider::new("gpt-4o");
        let body = provider.build_body(
            "Why is the sky blue?",
            "You are a helpful assistant.",
            &SendOptions::default(),
        );

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 1024);

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are a helpful assistant.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Why is the sky blue?");
    }

    #[test]
    fn test_openai_no_system() {
        let provider = OpenAiProvider::new("gpt-4o");
        let body = provider.build_body("hi", "", &SendOptions::default());
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_openai_per_call_overrides() {
        let provider = OpenAiProvider::new("gpt-4o-mini");
        let options = SendOptions::default()
            .with_model("gpt-4o")
            .with_temperature(0.3)
            .with_max_tokens(64)
            .with_extra("top_p", json!(0.9));
        let body = provider.build_body("p", "s", &options);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["top_p"], 0.9);
    }

    #[test]
    fn test_openai_parse_response_with_usage() {
        let resp = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"a\": 1}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let parsed = OpenAiProvider::parse_response(&resp);
        assert_eq!(parsed.text, "{\"a\": 1}");
        assert_eq!(parsed.usage, TokenUsage::new(10, 5));
    }

    #[test]
    fn test_openai_parse_response_missing_fields() {
        let parsed = OpenAiProvider::parse_response(&json!({}));
        assert_eq!(parsed.text, "");
        assert_eq!(parsed.usage, TokenUsage::default());
    }

    #[test]
    fn test_openai_auth_header() {
        let provider = OpenAiProvider::new("gpt-4o")
            .with_api_key("sk-test123")
            .with_organization("org-abc");

        let req = provider
            .build_http_request("https://api.openai.com/v1/chat/completions", &json!({}))
            .build()
            .expect("build request");

        assert_eq!(req.headers().get("Authorization").expect("auth header"), "Bearer sk-test123");
        assert_eq!(req.headers().get("OpenAI-Organization").expect("org header"), "org-abc");
    }

    #[test]
    fn test_openai_no_auth() {
        let provider = OpenAiProvider::new("gpt-4o");
        let req = provider
            .build_http_request("https://api.openai.com/v1/chat/completions", &json!({}))
            .build()
            .expect("build request");
        assert!(req.headers().get("Authorization").is_none());
        assert!(req.headers().get("OpenAI-Organization").is_none());
    }

    #[test]
    fn test_openai_from_config() {
        let config = ProviderConfig::new(ProviderDriver::Openai)
            .with_api_key("sk-abc")
            .with_base_url("http://localhost:8000/v1/")
            .with_temperature(0.5);
        let provider = OpenAiProvider::from_config("vllm", &config).unwrap();
        assert_eq!(provider.name(), "vllm");
        assert_eq!(provider.base_url, "http://localhost:8000");
        assert_eq!(provider.model, "gpt-4o-mini");
        assert_eq!(provider.temperature, 0.5);
        assert!(provider.has_api_key());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider = OpenAiProvider::new("gpt-4o").with_api_key("sk-1234567890abcdef");
        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains("1234567890abcdef"), "API key must not appear in Debug output");
        assert!(debug_output.contains("sk-123"), "Prefix should be visible for identification");
        assert!(debug_output.contains("***"), "Redaction marker must be present");
    }

    #[test]
    fn test_debug_no_key() {
        let debug_output = format!("{:?}", OpenAiProvider::new("gpt-4o"));
        assert!(debug_output.contains("None"), "No-key case should show None");
    }
}
