//! Retrying completion client.
//!
//! [`CompletionClient`] submits a role prompt plus an ordered list of content
//! messages to the configured [`Backend`] and retries every failure with
//! [`BackoffConfig`] until the attempt budget is spent.

use crate::{
    backend::{self, Backend, BackoffConfig, LlmRequest},
    error::Result,
    events::{emit, EventHandler, PipelineEvent},
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Sampling configuration for completion requests.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier sent with every request.
    pub model: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate. `None` lets the provider decide.
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl LlmConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// Completion client with bounded retry.
///
/// # Example
///
/// ```
/// use podcast_pipeline::backend::{BackoffConfig, MockBackend};
/// use podcast_pipeline::client::CompletionClient;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let client = CompletionClient::builder(Arc::new(MockBackend::fixed("hi")))
///     .backoff(BackoffConfig::immediate(3))
///     .build();
/// let text = client.complete("You are terse.", &["Say hi".to_string()]).await.unwrap();
/// assert_eq!(text, "hi");
/// # });
/// ```
pub struct CompletionClient {
    http: Client,
    base_url: String,
    backend: Arc<dyn Backend>,
    config: LlmConfig,
    backoff: BackoffConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl CompletionClient {
    /// Create a new builder around a backend.
    pub fn builder(backend: Arc<dyn Backend>) -> CompletionClientBuilder {
        CompletionClientBuilder {
            http: None,
            base_url: "https://api.openai.com".to_string(),
            backend,
            config: LlmConfig::default(),
            backoff: BackoffConfig::standard(),
            event_handler: None,
            timeout: None,
        }
    }

    /// The model every request is sent to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Submit `role_prompt` plus `messages` and return the generated text.
    ///
    /// Any failure is retried identically; after the last attempt the error
    /// surfaces as [`PipelineError::GenerationFailed`](crate::PipelineError::GenerationFailed).
    pub async fn complete(&self, role_prompt: &str, messages: &[String]) -> Result<String> {
        let mut request = LlmRequest::new(self.config.model.clone(), role_prompt, messages);
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;

        tracing::debug!(
            backend = self.backend.name(),
            model = %request.model,
            messages = messages.len(),
            "requesting completion"
        );

        let handler = self.event_handler.clone();
        let on_retry = |attempt: u32, delay: Duration, reason: &str| {
            emit(
                &handler,
                PipelineEvent::CallRetry {
                    service: "completion",
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let request = &request;
        let backend = self.backend.as_ref();
        let (http, base_url) = (&self.http, self.base_url.as_str());
        let response = backend::retry_with_backoff("completion", &self.backoff, on_retry, move || {
            backend.complete(http, base_url, request)
        })
        .await?;

        Ok(response.text)
    }
}

/// Builder for [`CompletionClient`].
pub struct CompletionClientBuilder {
    http: Option<Client>,
    base_url: String,
    backend: Arc<dyn Backend>,
    config: LlmConfig,
    backoff: BackoffConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
    timeout: Option<Duration>,
}

impl CompletionClientBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Set the provider base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set model and sampling parameters.
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the retry configuration. Default: [`BackoffConfig::standard()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Set the event handler that observes retries.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set the request timeout used when no custom client is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> CompletionClient {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(120));
        let http = self.http.unwrap_or_else(|| {
            Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default()
        });
        CompletionClient {
            http,
            base_url: normalize_base_url(&self.base_url),
            backend: self.backend,
            config: self.config,
            backoff: self.backoff,
            event_handler: self.event_handler,
        }
    }
}

/// Strip known provider path suffixes from a base URL so the backend can
/// append its own path without doubling it.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    for suffix in ["/v1/chat/completions", "/v1/chat", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::events::FnEventHandler;
    use crate::PipelineError;
    use std::sync::Mutex;

    fn client_with(mock: Arc<MockBackend>) -> CompletionClient {
        CompletionClient::builder(mock)
            .backoff(BackoffConfig::immediate(3))
            .build()
    }

    #[tokio::test]
    async fn test_complete_sends_role_prompt_and_messages() {
        let mock = Arc::new(MockBackend::fixed("answer"));
        let client = client_with(Arc::clone(&mock));

        let text = client
            .complete("You are a podcast planner.", &["s1".into(), "s2".into()])
            .await
            .unwrap();

        assert_eq!(text, "answer");
        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system_prompt(), Some("You are a podcast planner."));
        assert_eq!(requests[0].user_messages().collect::<Vec<_>>(), vec!["s1", "s2"]);
        assert_eq!(requests[0].model, "gpt-3.5-turbo");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mock = Arc::new(MockBackend::fixed("ok").failing_first(3));
        let client = client_with(Arc::clone(&mock));

        let text = client.complete("p", &["m".into()]).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_fails_after_fourth_attempt() {
        let mock = Arc::new(MockBackend::fixed("never").failing_first(10));
        let client = client_with(Arc::clone(&mock));

        let err = client.complete("p", &["m".into()]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::GenerationFailed { attempts: 4, .. }
        ));
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_retry_events_emitted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mock = Arc::new(MockBackend::fixed("ok").failing_first(2));
        let client = CompletionClient::builder(mock)
            .backoff(BackoffConfig::immediate(3))
            .event_handler(Arc::new(FnEventHandler(move |e| sink.lock().unwrap().push(e))))
            .build();

        client.complete("p", &[]).await.unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            PipelineEvent::CallRetry { service: "completion", attempt: 2, .. }
        ));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com");
        assert_eq!(
            normalize_base_url("https://api.openai.com/v1/chat/completions"),
            "https://api.openai.com"
        );
        assert_eq!(normalize_base_url("http://localhost:8000"), "http://localhost:8000");
    }
}
