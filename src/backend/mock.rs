//! Mock provider for testing without a live LLM.
//!
//! [`MockProvider`] returns pre-configured replies in order and records the
//! prompts it was sent, so tests can assert on both the loop's outcome and
//! the correction prompts it built.
//!
//! # Example
//!
//! ```
//! use llm_validator::backend::MockProvider;
//!
//! let mock = MockProvider::new(vec!["not json", r#"{"name": "John"}"#]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Provider, ProviderResponse, SendOptions};
use crate::attempt::TokenUsage;
use crate::error::Result;
use crate::ValidatorError;

/// One canned reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Returned as the response text.
    Text(String),
    /// Returned as [`ValidatorError::Provider`].
    Error(String),
    /// Returned as [`ValidatorError::HttpError`] with an empty body.
    Status(u16),
}

impl From<&str> for MockReply {
    fn from(text: &str) -> Self {
        MockReply::Text(text.to_string())
    }
}

impl From<String> for MockReply {
    fn from(text: String) -> Self {
        MockReply::Text(text)
    }
}

/// One prompt as the provider received it.
#[derive(Debug, Clone, PartialEq)]
pub struct SentPrompt {
    pub prompt: String,
    pub system_prompt: String,
    pub options: SendOptions,
}

/// A test provider that returns canned replies in order.
///
/// Cycles back to the beginning when all replies have been consumed. Every
/// text reply reports the same configured [`TokenUsage`].
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    replies: Vec<MockReply>,
    usage: TokenUsage,
    index: AtomicUsize,
    sent: Mutex<Vec<SentPrompt>>,
}

impl MockProvider {
    /// Create a mock with the given canned text responses.
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self::from_replies(responses.into_iter().map(|r| MockReply::Text(r.into())).collect())
    }

    /// Create a mock from a mix of text and error replies.
    pub fn from_replies(replies: Vec<MockReply>) -> Self {
        Self {
            name: "mock".into(),
            replies,
            usage: TokenUsage::new(10, 5),
            index: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock whose every call fails with a provider error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::from_replies(vec![MockReply::Error(message.into())])
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of `send` calls so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentPrompt> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Just the user prompts sent so far.
    pub fn prompts(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.prompt).collect()
    }

    fn next_reply(&self) -> Option<MockReply> {
        if self.replies.is_empty() {
            self.index.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        let idx = self.index.fetch_add(1, Ordering::SeqCst) % self.replies.len();
        Some(self.replies[idx].clone())
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn send(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<ProviderResponse> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentPrompt {
                prompt: prompt.to_string(),
                system_prompt: system_prompt.to_string(),
                options: options.clone(),
            });
        }
        match self.next_reply() {
            Some(MockReply::Text(text)) => Ok(ProviderResponse {
                text,
                usage: self.usage,
            }),
            Some(MockReply::Error(message)) => Err(ValidatorError::Provider {
                provider: self.name.clone(),
                message,
            }),
            Some(MockReply::Status(status)) => Err(ValidatorError::HttpError {
                status,
                body: String::new(),
                retry_after: None,
            }),
            None => Err(ValidatorError::Provider {
                provider: self.name.clone(),
                message: "no canned replies configured".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
