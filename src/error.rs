use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) and
    /// [`SpeechSynthesizer`](crate::speech::SpeechSynthesizer) implementations
    /// when the provider answers with a non-success status.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// A `create` request arrived without any input document.
    #[error("No input files")]
    MissingInput,

    /// The completion or speech service kept failing after every retry.
    #[error("{service} failed after {attempts} attempts: {message}")]
    GenerationFailed {
        /// Which service failed (`"completion"`, `"speech"`).
        service: &'static str,
        /// Total attempts made, including the first.
        attempts: u32,
        /// The last error observed.
        message: String,
    },

    /// A blob could not be read or written.
    #[error("storage error at '{key}': {message}")]
    Storage { key: String, message: String },

    /// The requested blob does not exist.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Publishing to the event bus failed.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Downloading an input document failed.
    #[error("failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    /// An inbound event envelope or payload could not be decoded.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Text could not be extracted from a stored document.
    #[error("failed to extract text from '{name}': {message}")]
    Extract { name: String, message: String },

    /// A document produced no text to summarize.
    #[error("document '{0}' contains no text")]
    EmptyDocument(String),

    /// The planner answered with a skeleton that holds no section.
    #[error("podcast plan contains no sections")]
    EmptyPlan,

    /// The reducer was handed an empty work-list.
    #[error("nothing to reduce: no partial summaries were produced")]
    NothingToReduce,

    /// Reduce rounds stopped shrinking the work-list: the coordinator kept
    /// answering with summaries too large to share a group.
    #[error("reduction stalled with {items} summaries after {rounds} rounds")]
    ReduceStalled { items: usize, rounds: usize },

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    pub(crate) fn storage(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PipelineError::Storage {
            key: key.into(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
