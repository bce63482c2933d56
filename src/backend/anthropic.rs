//! Provider for Anthropic's Messages API.
//!
//! Endpoint: `/v1/messages`. Auth via `x-api-key` plus a pinned
//! `anthropic-version` header. The system prompt travels in the top-level
//! `system` field rather than as a message.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{count, error_for_status, http_client, merge_extra, normalize_base_url, redact};
use super::{Provider, ProviderResponse, SendOptions};
use crate::attempt::TokenUsage;
use crate::config::{ProviderConfig, ProviderDriver};
use crate::error::Result;

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider for Claude models.
///
/// # Example
///
/// ```
/// use llm_validator::backend::AnthropicProvider;
///
/// let provider = AnthropicProvider::new("claude-3-5-haiku-latest").with_api_key("sk-ant-...");
/// ```
#[derive(Clone)]
pub struct AnthropicProvider {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    api_key: Option<String>,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>) -> Self {
        let defaults = ProviderConfig::default();
        Self {
            name: "anthropic".into(),
            client: Client::new(),
            base_url: ProviderDriver::Anthropic.default_base_url().into(),
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            api_key: None,
        }
    }

    /// Build from a `[providers.<name>]` entry.
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self> {
        let driver = ProviderDriver::Anthropic;
        Ok(Self {
            name: name.to_string(),
            client: http_client(config)?,
            base_url: normalize_base_url(&config.base_url_or_default(driver)),
            model: config.model_or_default(driver),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key: config.api_key.clone(),
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(&url.into());
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Build the request body for `/v1/messages`.
    fn build_body(&self, prompt: &str, system_prompt: &str, options: &SendOptions) -> Value {
        let mut body = json!({
            "model": options.model.as_deref().unwrap_or(&self.model),
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "temperature": options.temperature.unwrap_or(self.temperature),
        });
        if !system_prompt.is_empty() {
            body["system"] = json!(system_prompt);
        }
        merge_extra(&mut body, &options.extra);
        body
    }

    fn build_http_request(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body);
        if let Some(ref key) = self.api_key {
            req = req.header("x-api-key", key.as_str());
        }
        req
    }

    /// Concatenate all `text` content blocks.
    fn parse_response(json_resp: &Value) -> ProviderResponse {
        let text = json_resp
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default();
        let usage = TokenUsage::new(
            count(json_resp, &["usage", "input_tokens"]),
            count(json_resp, &["usage", "output_tokens"]),
        );
        ProviderResponse { text, usage }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn send(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<ProviderResponse> {
        let url = format!("{}/v1/messages", self.base_url);
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
    fn test_anthropic_payload() {
        let provider = AnthropicProvider::new("claude-3-5-haiku-latest");
        let body = provider.build_body("Extract the user.", "Reply in JSON.", &SendOptions::default());

        assert_eq!(body["model"], "claude-3-5-haiku-latest");
        assert_eq!(body["system"], "Reply in JSON.");
        assert_eq!(body["max_tokens"], 1024);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Extract the user.");
    }

    #[test]
    fn test_anthropic_no_system_field_when_empty() {
        let provider = AnthropicProvider::new("claude");
        let body = provider.build_body("p", "", &SendOptions::default());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_anthropic_headers() {
        let provider = AnthropicProvider::new("claude").with_api_key("sk-ant-123");
        let req = provider
            .build_http_request("https://api.anthropic.com/v1/messages", &json!({}))
            .build()
            .expect("build request");
        assert_eq!(req.headers().get("x-api-key").expect("key header"), "sk-ant-123");
        assert_eq!(
            req.headers().get("anthropic-version").expect("version header"),
            ANTHROPIC_VERSION
        );
        assert!(req.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_anthropic_parse_response() {
        let resp = json!({
            "content": [
                {"type": "text", "text": "{\"name\": "},
                {"type": "text", "text": "\"John\"}"}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 8}
        });
        let parsed = AnthropicProvider::parse_response(&resp);
        assert_eq!(parsed.text, "{\"name\": \"John\"}");
        assert_eq!(parsed.usage, TokenUsage::new(20, 8));
    }

    #[test]
    fn test_anthropic_from_config() {
        let config = ProviderConfig::default().with_api_key("sk-ant-abcdefgh");
        let provider = AnthropicProvider::from_config("anthropic", &config).unwrap();
        assert_eq!(provider.base_url, "https://api.anthropic.com");
        assert_eq!(provider.model, "claude-3-5-haiku-latest");
        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains("abcdefgh"));
    }
}
