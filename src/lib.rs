//! # Podcast Pipeline
//!
//! Event-driven pipeline that turns a set of documents into a narrated
//! podcast.
//!
//! ```text
//!  create ─► fetch ─► chunk ─► map/reduce summaries ─► plan ─► intro + closure
//!  extend ─► one section per planned outline
//!  produce ─► speech per part ─► join (intro, jingle, sections, jingle, closure)
//! ```
//!
//! Each stage reads its inputs from and writes its outputs to a per-podcast
//! [`Workspace`] in a [`BlobStore`](store::BlobStore). Stages are chained by
//! publishing [`EventMessage`](bus::EventMessage)s when the caller asks for
//! automatic chaining (`slow = "0"`).
//!
//! ## Core Concepts
//!
//! - **[`TextChunker`]**: splits text into chunks of at most M tokens.
//! - **[`RecursiveReducer`]**: summarizes every chunk, then merges summaries
//!   in token-budgeted groups until one remains.
//! - **[`stages`]**: Summarize, Plan, Expand and Synthesize+Concatenate.
//! - **[`StageOrchestrator`]**: runs `create`/`extend`/`produce` and chains
//!   them over the bus.
//! - **[`CompletionClient`]**: completion calls with bounded retry.
//!
//! ## Quick Start
//!
//! ```no_run
//! use podcast_pipeline::backend::MockBackend;
//! use podcast_pipeline::{CompletionClient, RecursiveReducer, TextChunker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CompletionClient::builder(Arc::new(MockBackend::fixed(
//!         "#summary#\nShort.\n#original statements#\n- quote",
//!     )))
//!     .build();
//!
//!     let chunks = TextChunker::new(500)?.chunk("A long document ...");
//!     let out = RecursiveReducer::new(Arc::new(client)).summarize(&chunks).await?;
//!     println!("{} ({} calls)", out.text, out.diagnostics.completion_calls());
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod backend;
pub mod bus;
pub mod chunker;
pub mod client;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod documents;
pub mod error;
pub mod events;
pub mod ingress;
pub mod orchestrator;
pub mod parsing;
pub mod prompt;
pub mod reducer;
pub mod server;
pub mod speech;
pub mod stages;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod workspace;

pub use backend::{BackoffConfig, MockBackend};
#[cfg(feature = "openai")]
pub use backend::OpenAiBackend;
pub use bus::{EventMessage, EventPublisher, StageCommand};
pub use chunker::TextChunker;
pub use client::{CompletionClient, LlmConfig};
pub use config::PipelineConfig;
pub use context::StageContext;
pub use diagnostics::ReduceDiagnostics;
pub use error::{PipelineError, Result};
pub use orchestrator::{Chaining, Invocation, Operation, PodcastState, StageOrchestrator, StageReport};
pub use reducer::RecursiveReducer;
pub use types::{PodcastPlan, SectionOutline, Skeleton, Summary};
pub use workspace::Workspace;
