//! Event bus messages and publishers.
//!
//! Stages hand work to each other through [`EventMessage`]s: a JSON
//! envelope naming the entity, the podcast id and the operation, with the
//! operation's arguments carried as a JSON *string* in `payload`.
//!
//! ```text
//! {"author": "alice", "entity": "spodkast", "entityId": "pod-1",
//!  "operation": "extend", "timestamp": "2024-05-01 10:00:00",
//!  "payload": "{\"user\":\"alice\",\"slow\":\"0\"}"}
//! ```

use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::ingress::{CreateRequest, RequestContext, StageRequest};
use crate::orchestrator::Operation;
use crate::PipelineError;

/// Timestamp format of [`EventMessage::timestamp`], local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bus envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub author: String,
    pub entity: String,
    pub entity_id: String,
    /// Kept as text so messages for other entities decode regardless of
    /// their operations.
    pub operation: String,
    pub timestamp: String,
    /// JSON-encoded arguments of the operation.
    pub payload: String,
}

/// An operation together with its decoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "payload", rename_all = "lowercase")]
pub enum StageCommand {
    Create(CreateRequest),
    Extend(StageRequest),
    Produce(StageRequest),
}

impl StageCommand {
    pub fn operation(&self) -> Operation {
        match self {
            StageCommand::Create(_) => Operation::Create,
            StageCommand::Extend(_) => Operation::Extend,
            StageCommand::Produce(_) => Operation::Produce,
        }
    }

    pub fn context(&self) -> &RequestContext {
        match self {
            StageCommand::Create(req) => &req.context,
            StageCommand::Extend(req) | StageCommand::Produce(req) => &req.context,
        }
    }
}

impl EventMessage {
    /// Build an envelope stamped with the current local time.
    pub fn new(
        author: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        command: &StageCommand,
    ) -> Result<Self> {
        let mut tagged = serde_json::to_value(command)?;
        let payload = tagged
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or_else(|| json!({}));
        Ok(Self {
            author: author.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            operation: command.operation().as_str().to_string(),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            payload: serde_json::to_string(&payload)?,
        })
    }

    /// Decode the payload into the command named by `operation`.
    pub fn command(&self) -> Result<StageCommand> {
        let payload: Value = serde_json::from_str(&self.payload)
            .map_err(|e| PipelineError::InvalidEvent(format!("payload is not JSON: {}", e)))?;
        serde_json::from_value(json!({"operation": self.operation, "payload": payload}))
            .map_err(|e| PipelineError::InvalidEvent(format!("bad '{}' payload: {}", self.operation, e)))
    }

    /// Decode a push delivery: either `{"message": {"data": <base64>}}`
    /// wrapping the envelope, or the bare envelope.
    pub fn from_push_body(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| PipelineError::InvalidEvent(format!("body is not JSON: {}", e)))?;

        let envelope = match value.pointer("/message/data").and_then(Value::as_str) {
            Some(data) => {
                let raw = base64::engine::general_purpose::STANDARD
                    .decode(data.trim())
                    .map_err(|e| PipelineError::InvalidEvent(format!("bad base64 data: {}", e)))?;
                serde_json::from_slice(&raw)
            }
            None => serde_json::from_value(value),
        };
        envelope.map_err(|e| PipelineError::InvalidEvent(format!("bad envelope: {}", e)))
    }

    /// The push-delivery wrapping of this message.
    pub fn to_push_body(&self) -> Result<Value> {
        let raw = serde_json::to_vec(self)?;
        Ok(json!({"message": {"data": base64::engine::general_purpose::STANDARD.encode(raw)}}))
    }
}

/// Destination of outgoing events.
///
/// This trait is object-safe and designed to be used as `Arc<dyn EventPublisher>`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: EventMessage) -> Result<()>;
}

/// Publishes into an in-process channel; the binary drains the receiver and
/// feeds the orchestrator.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<EventMessage>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, message: EventMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|e| PipelineError::Publish(format!("event channel closed: {}", e)))
    }
}

/// Keeps every published message; for tests.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<EventMessage>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<EventMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.operation).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, message: EventMessage) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| PipelineError::Publish("recorder lock poisoned".into()))?
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extend_command() -> StageCommand {
        StageCommand::Extend(StageRequest {
            context: RequestContext {
                user: Some("alice".into()),
                slow: Some("0".into()),
                ..Default::default()
            },
        })
    }

    #[test]
    fn test_envelope_shape() {
        let msg = EventMessage::new("alice", "spodkast", "pod-1", &extend_command()).unwrap();
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["entityId"], "pod-1");
        assert_eq!(value["operation"], "extend");
        assert_eq!(msg.payload, r#"{"slow":"0","user":"alice"}"#);
        assert!(chrono::NaiveDateTime::parse_from_str(&msg.timestamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_command_roundtrip_through_envelope() {
        let command = extend_command();
        let msg = EventMessage::new("alice", "spodkast", "pod-1", &command).unwrap();
        assert_eq!(msg.command().unwrap(), command);
    }

    #[test]
    fn test_create_payload_with_undefined_fields() {
        let msg = EventMessage {
            author: "#spokeAgent#".into(),
            entity: "spodkast".into(),
            entity_id: "pod-1".into(),
            operation: "create".into(),
            timestamp: "2024-05-01 10:00:00".into(),
            payload: r#"{"user":"undefined","conversationId":"bob.42","inputFiles":"https://x/a.pdf","requirements":"short","slow":"1"}"#.into(),
        };
        let StageCommand::Create(req) = msg.command().unwrap() else {
            panic!("expected create");
        };
        assert!(req.context.user.is_none());
        assert_eq!(req.context.conversation_id.as_deref(), Some("bob.42"));
        assert_eq!(req.input_files, vec!["https://x/a.pdf"]);
    }

    #[test]
    fn test_unknown_operation_is_invalid() {
        let mut msg = EventMessage::new("a", "spodkast", "p", &extend_command()).unwrap();
        msg.operation = "delete".into();
        assert!(matches!(msg.command(), Err(PipelineError::InvalidEvent(_))));
    }

    #[test]
    fn test_non_json_payload_is_invalid() {
        let mut msg = EventMessage::new("a", "spodkast", "p", &extend_command()).unwrap();
        msg.payload = "not json".into();
        assert!(matches!(msg.command(), Err(PipelineError::InvalidEvent(_))));
    }

    #[test]
    fn test_push_body_wrapped_and_bare() {
        let msg = EventMessage::new("a", "spodkast", "p", &extend_command()).unwrap();

        let wrapped = msg.to_push_body().unwrap().to_string();
        assert_eq!(EventMessage::from_push_body(wrapped.as_bytes()).unwrap(), msg);

        let bare = serde_json::to_vec(&msg).unwrap();
        assert_eq!(EventMessage::from_push_body(&bare).unwrap(), msg);

        assert!(EventMessage::from_push_body(br#"{"message":{"data":"%%%"}}"#).is_err());
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers() {
        let (publisher, mut rx) = ChannelPublisher::new(4);
        let msg = EventMessage::new("a", "spodkast", "p", &extend_command()).unwrap();
        publisher.publish(msg.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(msg));
    }

    #[tokio::test]
    async fn test_channel_publisher_closed() {
        let (publisher, rx) = ChannelPublisher::new(1);
        drop(rx);
        let msg = EventMessage::new("a", "spodkast", "p", &extend_command()).unwrap();
        assert!(matches!(publisher.publish(msg).await, Err(PipelineError::Publish(_))));
    }
}
