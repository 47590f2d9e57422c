//! ElevenLabs text-to-speech backend.
//!
//! Endpoint: `POST /v1/text-to-speech/{voice}` with `xi-api-key`
//! authentication, answering `audio/mpeg`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::SpeechSynthesizer;
use crate::backend::{error_from_response, redact};
use crate::error::Result;
use crate::PipelineError;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";

/// Synthesizer for the ElevenLabs API.
///
/// # Example
///
/// ```
/// use podcast_pipeline::speech::ElevenLabsSynthesizer;
///
/// let tts = ElevenLabsSynthesizer::new(reqwest::Client::new(), "xi-key")
///     .with_voice_settings(0.3, 0.8);
/// assert_eq!(tts.model_id(), "eleven_monolingual_v1");
/// ```
#[derive(Clone)]
pub struct ElevenLabsSynthesizer {
    http: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    stability: f64,
    similarity_boost: f64,
}

impl std::fmt::Debug for ElevenLabsSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsSynthesizer")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_id", &self.model_id)
            .field("stability", &self.stability)
            .field("similarity_boost", &self.similarity_boost)
            .finish()
    }
}

impl ElevenLabsSynthesizer {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_voice_settings(mut self, stability: f64, similarity_boost: f64) -> Self {
        self.stability = stability;
        self.similarity_boost = similarity_boost;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn build_body(&self, text: &str) -> Value {
        json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": self.stability,
                "similarity_boost": self.similarity_boost,
            },
        })
    }

    fn build_http_request(&self, voice: &str, text: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice);
        self.http
            .post(url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&self.build_body(text))
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, voice: &str, text: &str) -> Result<Vec<u8>> {
        if voice.is_empty() {
            return Err(PipelineError::InvalidConfig("no voice configured".into()));
        }

        let resp = self.build_http_request(voice, text).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let audio = resp.bytes().await?;
        if audio.is_empty() {
            return Err(PipelineError::Other("speech response has no audio".into()));
        }
        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}
