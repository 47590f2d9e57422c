//! Stage orchestration.
//!
//! A podcast moves through `Created → Planned → Expanded → Produced`, one
//! operation per step:
//!
//! ```text
//!   create ──► Summarize + Plan ──► Planned  ──(auto)──► extend
//!   extend ──► Expand            ──► Expanded ──(auto)──► produce
//!   produce ─► Synthesize + Join ──► Produced
//! ```
//!
//! With [`Chaining::Auto`] (`slow = "0"`) each stage publishes the event for
//! the next one on the bus; otherwise the caller triggers every step.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::bus::{EventMessage, EventPublisher, StageCommand};
use crate::context::StageContext;
use crate::diagnostics::ReduceDiagnostics;
use crate::error::Result;
use crate::events::{emit, PipelineEvent};
use crate::ingress::{CreateRequest, RequestContext, StageRequest};
use crate::stages;
use crate::types::Skeleton;
use crate::workspace::{self, Workspace};
use crate::PipelineError;

/// Default entity name on the bus.
pub const DEFAULT_ENTITY: &str = "spodkast";
/// Default author sentinel used by the conversational agent.
pub const DEFAULT_AGENT_SENTINEL: &str = "#spokeAgent#";

/// An operation on a podcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Extend,
    Produce,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Extend => "extend",
            Operation::Produce => "produce",
        }
    }

    /// The operation chained after this one.
    pub fn next(&self) -> Option<Operation> {
        match self {
            Operation::Create => Some(Operation::Extend),
            Operation::Extend => Some(Operation::Produce),
            Operation::Produce => None,
        }
    }

    /// State a podcast is in once this operation succeeds.
    pub fn reaches(&self) -> PodcastState {
        match self {
            Operation::Create => PodcastState::Planned,
            Operation::Extend => PodcastState::Expanded,
            Operation::Produce => PodcastState::Produced,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a podcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodcastState {
    Created,
    Planned,
    Expanded,
    Produced,
}

/// Whether a finished stage triggers the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chaining {
    Auto,
    Halt,
}

impl Chaining {
    /// `"0"` chains; anything else, or nothing, halts.
    pub fn from_slow(slow: Option<&str>) -> Self {
        match slow {
            Some("0") => Chaining::Auto,
            _ => Chaining::Halt,
        }
    }
}

/// Effective author: when the declared author is the agent sentinel, the
/// prefix of the conversation id before its first `.`.
pub fn resolve_author(declared: &str, conversation_id: Option<&str>, sentinel: &str) -> Result<String> {
    if declared != sentinel {
        return Ok(declared.to_string());
    }
    let conversation = conversation_id.ok_or_else(|| {
        PipelineError::InvalidEvent("agent request without conversationId".into())
    })?;
    let author = conversation.split('.').next().unwrap_or(conversation);
    if author.is_empty() {
        return Err(PipelineError::InvalidEvent(format!(
            "cannot derive author from conversationId '{}'",
            conversation
        )));
    }
    Ok(author.to_string())
}

/// One request to run an operation on a podcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Declared author (may be the agent sentinel).
    pub author: String,
    pub podcast_id: String,
    pub command: StageCommand,
}

impl Invocation {
    /// Build from a bus message.
    pub fn from_message(message: &EventMessage) -> Result<Self> {
        Ok(Self {
            author: message.author.clone(),
            podcast_id: message.entity_id.clone(),
            command: message.command()?,
        })
    }

    /// Build from a direct request whose context names author and podcast.
    pub fn from_command(command: StageCommand) -> Result<Self> {
        let ctx = command.context();
        let author = ctx
            .author
            .clone()
            .ok_or_else(|| PipelineError::InvalidEvent("missing author".into()))?;
        let podcast_id = ctx
            .name
            .clone()
            .ok_or_else(|| PipelineError::InvalidEvent("missing name".into()))?;
        Ok(Self {
            author,
            podcast_id,
            command,
        })
    }
}

/// Author and owner after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub author: String,
    pub user: String,
}

/// Outcome of a successful operation.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub workspace: String,
    pub podcast_id: String,
    pub user: String,
    pub operation: Operation,
    pub state: PodcastState,
    /// Present after `create`.
    pub skeleton: Option<Skeleton>,
    /// Present after `create`.
    pub diagnostics: Option<ReduceDiagnostics>,
    /// Planned sections after `create`, expanded sections after `extend`,
    /// synthesized sections after `produce`.
    pub sections: usize,
    /// Present after `produce`.
    pub podcast_key: Option<String>,
    /// The chained event, when one was published.
    pub next: Option<EventMessage>,
}

/// Bus identity of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSettings {
    pub entity: String,
    pub agent_sentinel: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            entity: DEFAULT_ENTITY.to_string(),
            agent_sentinel: DEFAULT_AGENT_SENTINEL.to_string(),
        }
    }
}

/// Runs operations and chains them over the bus.
pub struct StageOrchestrator {
    ctx: Arc<StageContext>,
    publisher: Arc<dyn EventPublisher>,
    bus: BusSettings,
}

impl fmt::Debug for StageOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageOrchestrator")
            .field("ctx", &self.ctx)
            .field("bus", &self.bus)
            .finish()
    }
}

impl StageOrchestrator {
    pub fn new(ctx: Arc<StageContext>, publisher: Arc<dyn EventPublisher>, bus: BusSettings) -> Self {
        Self { ctx, publisher, bus }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    pub fn bus(&self) -> &BusSettings {
        &self.bus
    }

    /// Resolve the effective author and workspace owner of a request.
    pub fn identity(&self, declared_author: &str, ctx: &RequestContext) -> Result<Identity> {
        let author = resolve_author(declared_author, ctx.conversation_id.as_deref(), &self.bus.agent_sentinel)?;
        let user = ctx.user.clone().unwrap_or_else(|| author.clone());
        Ok(Identity { author, user })
    }

    /// Handle a bus message. Messages for other entities are skipped.
    pub async fn handle_message(&self, message: EventMessage) -> Result<Option<StageReport>> {
        if message.entity != self.bus.entity {
            tracing::debug!(entity = %message.entity, "ignoring event for another entity");
            return Ok(None);
        }
        let invocation = Invocation::from_message(&message)?;
        self.handle(invocation).await.map(Some)
    }

    /// Run one operation.
    ///
    /// A failed stage leaves the podcast in its previous state and publishes
    /// nothing.
    pub async fn handle(&self, invocation: Invocation) -> Result<StageReport> {
        let operation = invocation.command.operation();
        let identity = self.identity(&invocation.author, invocation.command.context())?;
        let ws = Workspace::new(identity.user.clone(), invocation.podcast_id.clone())?;
        let span = tracing::info_span!("stage", workspace = %ws, operation = %operation);

        emit(
            &self.ctx.event_handler,
            PipelineEvent::StageStarted {
                workspace: ws.root(),
                operation,
            },
        );
        let result = self
            .run(&ws, &identity, invocation)
            .instrument(span.clone())
            .await;
        emit(
            &self.ctx.event_handler,
            PipelineEvent::StageFinished {
                workspace: ws.root(),
                operation,
                ok: result.is_ok(),
            },
        );

        span.in_scope(|| match &result {
            Ok(report) => tracing::info!(state = ?report.state, chained = report.next.is_some(), "stage finished"),
            Err(e) => tracing::error!(error = %e, "stage failed"),
        });
        result
    }

    async fn run(&self, ws: &Workspace, identity: &Identity, invocation: Invocation) -> Result<StageReport> {
        let Invocation {
            podcast_id,
            command,
            ..
        } = invocation;
        let operation = command.operation();
        let chaining = Chaining::from_slow(command.context().slow.as_deref());

        let mut report = StageReport {
            workspace: ws.root(),
            podcast_id: podcast_id.clone(),
            user: identity.user.clone(),
            operation,
            state: operation.reaches(),
            skeleton: None,
            diagnostics: None,
            sections: 0,
            podcast_key: None,
            next: None,
        };

        match command {
            StageCommand::Create(request) => self.create(ws, request, &mut report).await?,
            StageCommand::Extend(_) => {
                let out = stages::expand(&self.ctx, ws, None, None).await?;
                report.sections = out.sections.len();
            }
            StageCommand::Produce(_) => {
                let out = stages::produce(&self.ctx, ws, None, None, None).await?;
                report.sections = out.segments.len();
                report.podcast_key = Some(out.podcast_key);
            }
        }

        if chaining == Chaining::Auto {
            if let Some(next) = operation.next() {
                report.next = Some(self.chain(next, identity, &podcast_id).await?);
            }
        }
        Ok(report)
    }

    async fn create(&self, ws: &Workspace, request: CreateRequest, report: &mut StageReport) -> Result<()> {
        if request.input_files.is_empty() {
            return Err(PipelineError::MissingInput);
        }

        let requirements = match request.requirements {
            Some(text) => {
                self.ctx.store.put_text(&ws.key(workspace::REQUIREMENTS), &text).await?;
                text
            }
            None => self.ctx.store.get_text(&ws.key(workspace::REQUIREMENTS)).await?,
        };

        let mut names = Vec::with_capacity(request.input_files.len());
        for url in &request.input_files {
            let doc = self.ctx.fetcher.fetch(url).await?;
            tracing::debug!(url = %url, name = %doc.name, bytes = doc.bytes.len(), "input document stored");
            self.ctx.store.put(&ws.input_file(&doc.name), doc.bytes).await?;
            if !names.contains(&doc.name) {
                names.push(doc.name);
            }
        }

        let summarized = stages::summarize(&self.ctx, ws, Some(names)).await?;
        let summaries = summarized.summaries.into_iter().map(|(_, s)| s.raw).collect();
        let planned = stages::plan(&self.ctx, ws, Some(requirements), Some(summaries)).await?;

        report.sections = planned.plan.len();
        report.skeleton = Some(planned.skeleton());
        report.diagnostics = Some(summarized.diagnostics);
        Ok(())
    }

    /// Publish `operation` for the same podcast with `{user, slow: "0"}`.
    async fn chain(&self, operation: Operation, identity: &Identity, podcast_id: &str) -> Result<EventMessage> {
        let request = StageRequest {
            context: RequestContext {
                user: Some(identity.user.clone()),
                slow: Some("0".to_string()),
                ..Default::default()
            },
        };
        let command = match operation {
            Operation::Extend => StageCommand::Extend(request),
            Operation::Produce => StageCommand::Produce(request),
            Operation::Create => StageCommand::Create(CreateRequest {
                context: request.context,
                ..Default::default()
            }),
        };
        self.publish(&identity.author, podcast_id, &command).await
    }

    /// Publish `command` for a podcast on the bus.
    pub async fn publish(&self, author: &str, podcast_id: &str, command: &StageCommand) -> Result<EventMessage> {
        let message = EventMessage::new(author, &self.bus.entity, podcast_id, command)?;
        self.publisher.publish(message.clone()).await?;
        tracing::info!(operation = %message.operation, podcast = podcast_id, author, "event published");
        emit(
            &self.ctx.event_handler,
            PipelineEvent::EventPublished {
                operation: command.operation(),
                entity_id: podcast_id.to_string(),
            },
        );
        Ok(message)
    }
}
