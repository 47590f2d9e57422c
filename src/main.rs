//! `podcast-pipeline` server.
//!
//! Serves the HTTP ingress and drains the in-process event bus into the
//! stage orchestrator.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use podcast_pipeline::backend::OpenAiBackend;
use podcast_pipeline::bus::{ChannelPublisher, EventMessage};
use podcast_pipeline::client::CompletionClient;
use podcast_pipeline::config::PipelineConfig;
use podcast_pipeline::context::StageContext;
use podcast_pipeline::documents::HttpFetcher;
use podcast_pipeline::events::{EventHandler, PipelineEvent};
use podcast_pipeline::orchestrator::StageOrchestrator;
use podcast_pipeline::server::{create_router, AppState};
use podcast_pipeline::speech::{ElevenLabsSynthesizer, SpeechClient};
use podcast_pipeline::store::FsBlobStore;
use podcast_pipeline::telemetry;

#[derive(Parser, Debug)]
#[command(name = "podcast-pipeline")]
#[command(about = "Turns documents into a narrated podcast")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "PODCAST_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on; overrides `server.port`
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

/// Logs retries and stage transitions.
struct LogEvents;

impl EventHandler for LogEvents {
    fn on_event(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::CallRetry {
                service,
                attempt,
                delay_ms,
                reason,
            } => warn!(service, attempt, delay_ms, reason = %reason, "retrying call"),
            other => tracing::debug!(event = ?other, "pipeline event"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = PipelineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    telemetry::init_tracing(&config.logging);

    let events: Arc<dyn EventHandler> = Arc::new(LogEvents);
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.llm.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let mut backend = OpenAiBackend::new();
    match &config.llm.api_key {
        Some(key) => backend = backend.with_api_key(key.clone()),
        None => warn!("no completion API key configured (OPENAI_KEY)"),
    }
    let completions = CompletionClient::builder(Arc::new(backend))
        .http_client(http.clone())
        .base_url(config.llm.base_url.clone())
        .config(config.llm_config())
        .backoff(config.backoff())
        .event_handler(Arc::clone(&events))
        .build();

    let speech_key = config.speech.api_key.clone().unwrap_or_else(|| {
        warn!("no speech API key configured (ELEVENLABS_KEY)");
        String::new()
    });
    let synthesizer = ElevenLabsSynthesizer::new(http.clone(), speech_key)
        .with_base_url(config.speech.base_url.clone())
        .with_model_id(config.speech.model_id.clone())
        .with_voice_settings(config.speech.stability, config.speech.similarity_boost);
    let speech = SpeechClient::new(Arc::new(synthesizer), config.speech.voices.clone())
        .with_backoff(config.backoff())
        .with_event_handler(Arc::clone(&events));

    let store = Arc::new(FsBlobStore::new(config.storage.root.clone()));
    info!(root = %config.storage.root.display(), "blob store ready");

    let ctx = StageContext::builder(store, Arc::new(completions), Arc::new(speech))
        .fetcher(Arc::new(HttpFetcher::new(http)))
        .chunk_tokens(config.summarization.chunk_tokens)
        .reduce_budget(config.summarization.reduce_budget)
        .concurrency(config.summarization.concurrency)
        .max_stalled_rounds(config.summarization.max_stalled_rounds)
        .jingle_key(config.audio.jingle_key.clone())
        .event_handler(events)
        .build()
        .context("Invalid stage configuration")?;

    let (publisher, rx) = ChannelPublisher::new(config.bus.channel_capacity);
    let orchestrator = Arc::new(StageOrchestrator::new(
        Arc::new(ctx),
        Arc::new(publisher),
        config.bus_settings(),
    ));
    let dispatcher = tokio::spawn(dispatch(Arc::clone(&orchestrator), rx));

    let app = create_router(AppState { orchestrator });
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, entity = %config.bus.entity, "podcast pipeline listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    dispatcher.abort();
    info!("server shutdown complete");
    Ok(())
}

/// Feed bus messages to the orchestrator, one task per message.
async fn dispatch(orchestrator: Arc<StageOrchestrator>, mut rx: mpsc::Receiver<EventMessage>) {
    while let Some(message) = rx.recv().await {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            let entity_id = message.entity_id.clone();
            let operation = message.operation.clone();
            if let Err(e) = orchestrator.handle_message(message).await {
                error!(error = %e, podcast = %entity_id, operation = %operation, "event handling failed");
            }
        });
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
