//! Text-to-speech synthesis.
//!
//! [`SpeechSynthesizer`] abstracts the provider; [`SpeechClient`] picks the
//! voice for each part of the podcast and retries failed calls with the same
//! bounded backoff as completion calls.

pub mod elevenlabs;
pub mod mock;

pub use elevenlabs::ElevenLabsSynthesizer;
pub use mock::MockSynthesizer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{retry_with_backoff, BackoffConfig};
use crate::error::Result;
use crate::events::{emit, EventHandler, PipelineEvent};

/// Abstraction over speech providers.
///
/// Returns encoded audio (MP3) for `text` read by `voice`.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<u8>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Which part of the podcast is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Introduction,
    Section,
    Closure,
}

/// Voice identifiers per speaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceMap {
    pub introduction: String,
    pub section: String,
    pub closure: String,
}

impl VoiceMap {
    pub fn for_speaker(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Introduction => &self.introduction,
            Speaker::Section => &self.section,
            Speaker::Closure => &self.closure,
        }
    }
}

/// Synthesizer with per-speaker voices and bounded retry.
pub struct SpeechClient {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voices: VoiceMap,
    backoff: BackoffConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for SpeechClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechClient")
            .field("synthesizer", &self.synthesizer.name())
            .field("voices", &self.voices)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl SpeechClient {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, voices: VoiceMap) -> Self {
        Self {
            synthesizer,
            voices,
            backoff: BackoffConfig::standard(),
            event_handler: None,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Read `text` with the voice configured for `speaker`.
    pub async fn speak(&self, speaker: Speaker, text: &str) -> Result<Vec<u8>> {
        let voice = self.voices.for_speaker(speaker);
        tracing::debug!(
            synthesizer = self.synthesizer.name(),
            ?speaker,
            voice,
            chars = text.len(),
            "synthesizing speech"
        );

        let handler = self.event_handler.clone();
        let on_retry = |attempt: u32, delay: Duration, reason: &str| {
            emit(
                &handler,
                PipelineEvent::CallRetry {
                    service: "speech",
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let synthesizer = self.synthesizer.as_ref();
        retry_with_backoff("speech", &self.backoff, on_retry, move || {
            synthesizer.synthesize(voice, text)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;

    fn voices() -> VoiceMap {
        VoiceMap {
            introduction: "v-intro".into(),
            section: "v-section".into(),
            closure: "v-closure".into(),
        }
    }

    #[tokio::test]
    async fn test_speak_uses_speaker_voice() {
        let mock = Arc::new(MockSynthesizer::new());
        let client = SpeechClient::new(mock.clone(), voices()).with_backoff(BackoffConfig::none());

        let audio = client.speak(Speaker::Closure, "goodbye").await.unwrap();

        assert_eq!(audio, b"[v-closure:goodbye]");
        assert_eq!(mock.calls(), vec![("v-closure".to_string(), "goodbye".to_string())]);
    }

    #[tokio::test]
    async fn test_speak_retries_then_fails() {
        let mock = Arc::new(MockSynthesizer::new().failing_first(10));
        let client = SpeechClient::new(mock.clone(), voices()).with_backoff(BackoffConfig::immediate(3));

        let err = client.speak(Speaker::Section, "text").await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::GenerationFailed { service: "speech", attempts: 4, .. }
        ));
        assert_eq!(mock.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_speak_recovers_after_transient_failure() {
        let mock = Arc::new(MockSynthesizer::new().failing_first(1));
        let client = SpeechClient::new(mock.clone(), voices()).with_backoff(BackoffConfig::immediate(3));
        assert!(client.speak(Speaker::Introduction, "hi").await.is_ok());
        assert_eq!(mock.calls().len(), 2);
    }
}
