//! Shared collaborators for stage execution.
//!
//! [`StageContext`] carries the blob store, completion and speech clients,
//! document fetcher, text extractor, audio joiner, and summarization
//! settings. It is constructed once and shared by every stage run.

use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioJoiner, ByteAppendJoiner};
use crate::chunker::{TextChunker, DEFAULT_CHUNK_TOKENS};
use crate::client::CompletionClient;
use crate::documents::{DocumentExtractor, DocumentFetcher, HttpFetcher, TextExtractor};
use crate::error::Result;
use crate::events::EventHandler;
use crate::reducer::{
    RecursiveReducer, DEFAULT_CONCURRENCY, DEFAULT_MAX_STALLED_ROUNDS, DEFAULT_REDUCE_BUDGET,
};
use crate::speech::SpeechClient;
use crate::store::BlobStore;
use crate::PipelineError;

/// Everything a stage needs from its environment.
///
/// # Example
///
/// ```
/// use podcast_pipeline::backend::MockBackend;
/// use podcast_pipeline::client::CompletionClient;
/// use podcast_pipeline::context::StageContext;
/// use podcast_pipeline::speech::{MockSynthesizer, SpeechClient, VoiceMap};
/// use podcast_pipeline::store::MemoryBlobStore;
/// use std::sync::Arc;
///
/// let ctx = StageContext::builder(
///     Arc::new(MemoryBlobStore::new()),
///     Arc::new(CompletionClient::builder(Arc::new(MockBackend::fixed("ok"))).build()),
///     Arc::new(SpeechClient::new(Arc::new(MockSynthesizer::new()), VoiceMap::default())),
/// )
/// .chunk_tokens(500)
/// .build()
/// .unwrap();
/// assert_eq!(ctx.chunker.max_tokens(), 500);
/// ```
pub struct StageContext {
    pub store: Arc<dyn BlobStore>,
    pub completions: Arc<CompletionClient>,
    pub speech: Arc<SpeechClient>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub extractor: Arc<dyn TextExtractor>,
    pub joiner: Arc<dyn AudioJoiner>,
    pub chunker: TextChunker,
    pub reducer: RecursiveReducer,
    /// Blob key of the jingle played around the sections, if any.
    pub jingle_key: Option<String>,
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("completions", &self.completions)
            .field("speech", &self.speech)
            .field("chunker", &self.chunker)
            .field("reduce_budget", &self.reducer.budget())
            .field("jingle_key", &self.jingle_key)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

impl StageContext {
    /// Create a builder from the three collaborators without defaults.
    pub fn builder(
        store: Arc<dyn BlobStore>,
        completions: Arc<CompletionClient>,
        speech: Arc<SpeechClient>,
    ) -> StageContextBuilder {
        StageContextBuilder {
            store,
            completions,
            speech,
            fetcher: None,
            extractor: None,
            joiner: None,
            chunk_tokens: DEFAULT_CHUNK_TOKENS,
            reduce_budget: DEFAULT_REDUCE_BUDGET,
            concurrency: DEFAULT_CONCURRENCY,
            max_stalled_rounds: DEFAULT_MAX_STALLED_ROUNDS,
            jingle_key: None,
            event_handler: None,
        }
    }
}

/// Builder for [`StageContext`].
pub struct StageContextBuilder {
    store: Arc<dyn BlobStore>,
    completions: Arc<CompletionClient>,
    speech: Arc<SpeechClient>,
    fetcher: Option<Arc<dyn DocumentFetcher>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    joiner: Option<Arc<dyn AudioJoiner>>,
    chunk_tokens: usize,
    reduce_budget: usize,
    concurrency: usize,
    max_stalled_rounds: usize,
    jingle_key: Option<String>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl StageContextBuilder {
    /// Set the document fetcher. Default: [`HttpFetcher`] with a 120s timeout.
    pub fn fetcher(mut self, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Set the text extractor. Default: [`DocumentExtractor`], which reads
    /// PDFs and UTF-8 text.
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the audio joiner. Default: [`ByteAppendJoiner`].
    pub fn joiner(mut self, joiner: Arc<dyn AudioJoiner>) -> Self {
        self.joiner = Some(joiner);
        self
    }

    /// Tokens per chunk. Default: 2000.
    pub fn chunk_tokens(mut self, tokens: usize) -> Self {
        self.chunk_tokens = tokens;
        self
    }

    /// Token budget of one merge group. Default: 2000.
    pub fn reduce_budget(mut self, tokens: usize) -> Self {
        self.reduce_budget = tokens;
        self
    }

    /// Concurrent completion calls during summarization. Default: 4.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    /// Reduce rounds allowed to end without shrinking the work-list. Default: 3.
    pub fn max_stalled_rounds(mut self, rounds: usize) -> Self {
        self.max_stalled_rounds = rounds;
        self
    }

    /// Blob key of the jingle.
    pub fn jingle_key(mut self, key: Option<String>) -> Self {
        self.jingle_key = key;
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the context, validating the summarization settings.
    pub fn build(self) -> Result<StageContext> {
        if self.reduce_budget == 0 {
            return Err(PipelineError::InvalidConfig("reduce budget must be positive".into()));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfig("concurrency must be positive".into()));
        }
        if self.max_stalled_rounds == 0 {
            return Err(PipelineError::InvalidConfig("max stalled rounds must be positive".into()));
        }
        let chunker = TextChunker::new(self.chunk_tokens)?;
        let reducer = RecursiveReducer::new(Arc::clone(&self.completions))
            .with_budget(self.reduce_budget)
            .with_concurrency(self.concurrency)
            .with_max_stalled_rounds(self.max_stalled_rounds);

        Ok(StageContext {
            store: self.store,
            completions: self.completions,
            speech: self.speech,
            fetcher: self
                .fetcher
                .unwrap_or_else(|| Arc::new(HttpFetcher::with_timeout(Duration::from_secs(120)))),
            extractor: self.extractor.unwrap_or_else(|| Arc::new(DocumentExtractor)),
            joiner: self.joiner.unwrap_or_else(|| Arc::new(ByteAppendJoiner)),
            chunker,
            reducer,
            jingle_key: self.jingle_key,
            event_handler: self.event_handler,
        })
    }
}
