//! Runtime configuration.
//!
//! Loaded from a TOML file, then overridden from the environment, then
//! validated. Every section has defaults, so an empty file is a valid config.
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [speech.voices]
//! introduction = "21m00Tcm4TlvDq8ikWAM"
//!
//! [summarization]
//! chunk_tokens = 1500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::BackoffConfig;
use crate::client::LlmConfig;
use crate::error::Result;
use crate::orchestrator::{BusSettings, DEFAULT_AGENT_SENTINEL, DEFAULT_ENTITY};
use crate::speech::elevenlabs::{DEFAULT_BASE_URL as SPEECH_BASE_URL, DEFAULT_MODEL_ID};
use crate::speech::VoiceMap;
use crate::PipelineError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub speech: SpeechSettings,
    pub storage: StorageSettings,
    pub summarization: SummarizationSettings,
    pub retry: RetrySettings,
    pub bus: BusConfig,
    pub audio: AudioSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let defaults = LlmConfig::default();
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: defaults.model,
            api_key: None,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            timeout_secs: 120,
        }
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_deref().map(crate::backend::redact))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub base_url: String,
    pub model_id: String,
    pub api_key: Option<String>,
    pub voices: VoiceMap,
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            base_url: SPEECH_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_key: None,
            voices: VoiceMap::default(),
            stability: 0.5,
            similarity_boost: 0.5,
        }
    }
}

impl std::fmt::Debug for SpeechSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSettings")
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("api_key", &self.api_key.as_deref().map(crate::backend::redact))
            .field("voices", &self.voices)
            .field("stability", &self.stability)
            .field("similarity_boost", &self.similarity_boost)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory of the blob store.
    pub root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    pub chunk_tokens: usize,
    pub reduce_budget: usize,
    pub concurrency: usize,
    pub max_stalled_rounds: usize,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            chunk_tokens: crate::chunker::DEFAULT_CHUNK_TOKENS,
            reduce_budget: crate::reducer::DEFAULT_REDUCE_BUDGET,
            concurrency: crate::reducer::DEFAULT_CONCURRENCY,
            max_stalled_rounds: crate::reducer::DEFAULT_MAX_STALLED_ROUNDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub entity: String,
    pub agent_sentinel: String,
    /// Capacity of the in-process event channel.
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            entity: DEFAULT_ENTITY.to_string(),
            agent_sentinel: DEFAULT_AGENT_SENTINEL.to_string(),
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Blob key of the jingle placed around the sections.
    pub jingle_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub json: bool,
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

impl PipelineConfig {
    /// Parse TOML without touching the environment.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    /// Read `path` (defaults when `None`), apply environment overrides and
    /// validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override secrets and voices from `lookup` (the environment in
    /// [`load`](Self::load)). Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = get("ELEVENLABS_KEY") {
            self.speech.api_key = Some(key);
        }
        if let Some(voice) = get("VOICE_INTRODUCTION") {
            self.speech.voices.introduction = voice;
        }
        if let Some(voice) = get("VOICE_SECTION") {
            self.speech.voices.section = voice;
        }
        if let Some(voice) = get("VOICE_CLOSURE") {
            self.speech.voices.closure = voice;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.summarization;
        for (name, value) in [
            ("summarization.chunk_tokens", s.chunk_tokens),
            ("summarization.reduce_budget", s.reduce_budget),
            ("summarization.concurrency", s.concurrency),
            ("summarization.max_stalled_rounds", s.max_stalled_rounds),
            ("bus.channel_capacity", self.bus.channel_capacity),
        ] {
            if value == 0 {
                return Err(PipelineError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.bus.entity.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("bus.entity must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PipelineError::InvalidConfig(format!(
                "llm.temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            )));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(PipelineError::InvalidConfig(
                "retry.initial_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_retries: self.retry.max_retries,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            ..BackoffConfig::standard()
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        let config = LlmConfig::default()
            .with_model(self.llm.model.clone())
            .with_temperature(self.llm.temperature);
        match self.llm.max_tokens {
            Some(tokens) => config.with_max_tokens(tokens),
            None => config,
        }
    }

    pub fn bus_settings(&self) -> BusSettings {
        BusSettings {
            entity: self.bus.entity.clone(),
            agent_sentinel: self.bus.agent_sentinel.clone(),
        }
    }
}
