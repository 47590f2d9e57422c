//! Mock synthesizer for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::SpeechSynthesizer;
use crate::error::Result;
use crate::PipelineError;

/// Returns `[<voice>:<text>]` as the "audio" and records every call.
#[derive(Debug, Default)]
pub struct MockSynthesizer {
    failures_left: AtomicUsize,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` calls with a 503.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::Relaxed);
        self
    }

    /// `(voice, text)` of every call so far, failed ones included.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Audio the mock produces for `voice` reading `text`.
    pub fn render(voice: &str, text: &str) -> Vec<u8> {
        format!("[{}:{}]", voice, text).into_bytes()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<u8>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((voice.to_string(), text.to_string()));
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PipelineError::HttpError {
                status: 503,
                body: "mock speech unavailable".into(),
                retry_after: None,
            });
        }
        Ok(Self::render(voice, text))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
