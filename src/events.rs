//! Lifecycle hooks for stage execution.
//!
//! Provides an optional, non-intrusive way to observe the orchestrator.
//! Stages report when they start and finish, when an external call is
//! retried, and when the next event is handed to the bus. Implement
//! [`EventHandler`] to receive these for progress tracking or metrics.

use std::sync::Arc;

use crate::orchestrator::Operation;

/// Events emitted while stages run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A stage has started for a workspace.
    StageStarted {
        /// Workspace root key (`<owner>/<podcast>`).
        workspace: String,
        /// Operation being run.
        operation: Operation,
    },
    /// A stage has finished for a workspace.
    StageFinished {
        /// Workspace root key.
        workspace: String,
        /// Operation that ran.
        operation: Operation,
        /// Whether the stage succeeded.
        ok: bool,
    },
    /// An external call is about to be retried.
    CallRetry {
        /// `"completion"` or `"speech"`.
        service: &'static str,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Reason for the retry (error description).
        reason: String,
    },
    /// The next stage was requested on the bus.
    EventPublished {
        /// Operation of the published event.
        operation: Operation,
        /// Entity (podcast) id.
        entity_id: String,
    },
}

/// Handler for pipeline lifecycle events.
///
/// This is entirely optional: the pipeline works without an event handler.
///
/// # Example
///
/// ```
/// use podcast_pipeline::events::{EventHandler, PipelineEvent};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: PipelineEvent) {
///         if let PipelineEvent::StageFinished { workspace, ok, .. } = event {
///             println!("[done] {} ok={}", workspace, ok);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the pipeline emits an event.
    fn on_event(&self, event: PipelineEvent);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: PipelineEvent) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
pub struct FnEventHandler<F: Fn(PipelineEvent) + Send + Sync>(pub F);

impl<F: Fn(PipelineEvent) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: PipelineEvent) {
        (self.0)(event);
    }
}
