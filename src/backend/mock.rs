//! Mock backend for testing without a live model.
//!
//! [`MockBackend`] either returns pre-configured responses in order or
//! delegates to a responder closure that sees the whole request. Every
//! request is recorded so tests can assert on prompts and call counts.
//!
//! # Example
//!
//! ```
//! use podcast_pipeline::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec!["Hello, world!".to_string()]);
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;

type Responder = Arc<dyn Fn(&LlmRequest) -> Result<String> + Send + Sync>;

/// A test backend that returns canned or computed responses.
pub struct MockBackend {
    responder: Responder,
    failures_left: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("calls", &self.call_count())
            .field("failures_left", &self.failures_left.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockBackend {
    /// Create a mock backend with the given canned responses.
    ///
    /// Responses are returned in order. When exhausted, cycles from the beginning.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockBackend requires at least one response");
        let index = AtomicUsize::new(0);
        Self::from_fn(move |_| {
            let idx = index.fetch_add(1, Ordering::Relaxed) % responses.len();
            Ok(responses[idx].clone())
        })
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock whose answer is computed from the request.
    pub fn from_fn(f: impl Fn(&LlmRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(f),
            failures_left: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `n` calls with a 503 before answering normally.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::Relaxed);
        self
    }

    /// Number of calls received so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Snapshot of every request received, in arrival order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of received requests whose system prompt contains `needle`.
    pub fn calls_with_prompt(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.system_prompt().is_some_and(|s| s.contains(needle)))
            .count()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        if self.take_failure() {
            return Err(PipelineError::HttpError {
                status: 503,
                body: "mock unavailable".into(),
                retry_after: None,
            });
        }
        let text = (self.responder)(request)?;
        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
