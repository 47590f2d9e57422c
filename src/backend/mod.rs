//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over text-generation providers,
//! translating between normalized [`LlmRequest`]/[`LlmResponse`] types and
//! provider-specific HTTP APIs.
//!
//! ```text
//! CompletionClient ──► LlmRequest ──► Backend::complete() ──► LlmResponse
//!                                            │
//!                                 ┌──────────┴──────────┐
//!                            OpenAiBackend          MockBackend
//!                        /v1/chat/completions     canned / scripted
//! ```

pub mod backoff;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;

pub use backoff::{retry_with_backoff, BackoffConfig, JitterStrategy};
pub use mock::MockBackend;
#[cfg(feature = "openai")]
pub use openai::OpenAiBackend;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;

/// A normalized completion request: one role prompt plus ordered user messages.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"gpt-3.5-turbo"`).
    pub model: String,

    /// Conversation, system prompt first.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature.
    pub temperature: f64,

    /// Upper bound on generated tokens, if any.
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    /// Build a request from a role prompt and a list of user messages.
    pub fn new(model: impl Into<String>, system: &str, user_messages: &[String]) -> Self {
        let mut messages = Vec::with_capacity(user_messages.len() + 1);
        messages.push(ChatMessage {
            role: Role::System,
            content: system.to_string(),
        });
        messages.extend(user_messages.iter().map(|m| ChatMessage {
            role: Role::User,
            content: m.clone(),
        }));
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// The system (role) prompt, if present.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// User message contents in order.
    pub fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The message content.
    pub content: String,
}

/// The role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A normalized completion response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, model info).
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over text-generation providers.
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a single, non-streaming completion call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value given in whole seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}

/// Show only a short prefix of a secret in `Debug` output.
pub(crate) fn redact(key: &str) -> String {
    match key.get(..6) {
        Some(prefix) if key.len() > 6 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

/// Turn a non-success HTTP response into [`PipelineError::HttpError`].
pub(crate) async fn error_from_response(resp: reqwest::Response) -> crate::PipelineError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();
    crate::PipelineError::HttpError {
        status,
        body,
        retry_after,
    }
}
