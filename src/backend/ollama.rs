//! Provider for Ollama's native API.
//!
//! Always uses `/api/chat` with `stream: false`. Token usage comes from
//! `prompt_eval_count` and `eval_count`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{count, error_for_status, http_client, merge_extra, normalize_base_url};
use super::{Provider, ProviderResponse, SendOptions};
use crate::attempt::TokenUsage;
use crate::config::{ProviderConfig, ProviderDriver};
use crate::error::Result;

/// Provider for a local or remote Ollama server.
///
/// # Example
///
/// ```
/// use llm_validator::backend::OllamaProvider;
///
/// let provider = OllamaProvider::new("llama3.2:3b").with_base_url("http://gpu-box:11434");
/// ```
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Self {
        let defaults = ProviderConfig::default();
        Self {
            name: "ollama".into(),
            client: Client::new(),
            base_url: ProviderDriver::Ollama.default_base_url().into(),
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    /// Build from a `[providers.<name>]` entry. `api_key` is ignored.
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self> {
        let driver = ProviderDriver::Ollama;
        Ok(Self {
            name: name.to_string(),
            client: http_client(config)?,
            base_url: normalize_base_url(&config.base_url_or_default(driver)),
            model: config.model_or_default(driver),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
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

    /// Build the Ollama `options` object. `extra` entries land here.
    fn build_options(&self, options: &SendOptions) -> Value {
        let mut opts = json!({
            "temperature": options.temperature.unwrap_or(self.temperature),
            "num_predict": options.max_tokens.unwrap_or(self.max_tokens),
        });
        merge_extra(&mut opts, &options.extra);
        opts
    }

    /// Build the JSON body for `/api/chat`.
    fn build_body(&self, prompt: &str, system_prompt: &str, options: &SendOptions) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        json!({
            "model": options.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "stream": false,
            "options": self.build_options(options),
        })
    }

    fn parse_response(json_resp: &Value) -> ProviderResponse {
        let text = json_resp
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let usage = TokenUsage::new(
            count(json_resp, &["prompt_eval_count"]),
            count(json_resp, &["eval_count"]),
        );
        ProviderResponse { text, usage }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn send(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<ProviderResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_body(prompt, system_prompt, options);

        let resp = self.client.post(&url).json(&body).send().await?;
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
    fn test_ollama_chat_payload() {
        let provider = OllamaProvider::new("llama3.2");
        let body = provider.build_body(
            "Why is the sky blue?",
            "You are a helpful assistant.",
            &SendOptions::default(),
        );

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["num_predict"], 1024);

        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Why is the sky blue?");
    }

    #[test]
    fn test_ollama_extra_goes_into_options() {
        let provider = OllamaProvider::new("llama3.2");
        let options = SendOptions::default()
            .with_temperature(0.7)
            .with_extra("top_p", json!(0.9))
            .with_extra("seed", json!(42));
        let body = provider.build_body("p", "", &options);
        assert_eq!(body["options"]["top_p"], 0.9);
        assert_eq!(body["options"]["seed"], 42);
        assert_eq!(body["options"]["temperature"], 0.7);
        assert!(body.get("top_p").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_ollama_parse_response() {
        let resp = json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "{\"ok\": true}"},
            "done": true,
            "prompt_eval_count": 26,
            "eval_count": 12
        });
        let parsed = OllamaProvider::parse_response(&resp);
        assert_eq!(parsed.text, "{\"ok\": true}");
        assert_eq!(parsed.usage, TokenUsage::new(26, 12));
        assert_eq!(parsed.usage.total_tokens, 38);
    }

    #[test]
    fn test_ollama_from_config() {
        let config = ProviderConfig::default()
            .with_base_url("http://gpu-box:11434/api/")
            .with_model("qwen2.5:7b");
        let provider = OllamaProvider::from_config("local", &config).unwrap();
        assert_eq!(provider.name(), "local");
        assert_eq!(provider.base_url, "http://gpu-box:11434");
        assert_eq!(provider.model, "qwen2.5:7b");
    }
}
