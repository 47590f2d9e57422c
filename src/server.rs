//! HTTP ingress.
//!
//! `POST /create` runs the create stage synchronously; `/extend` and
//! `/produce` publish the stage event and return at once; `/events` accepts
//! push deliveries from the bus.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::bus::{EventMessage, StageCommand};
use crate::ingress::{CreateRequest, StageRequest};
use crate::orchestrator::{Invocation, Operation, StageOrchestrator};
use crate::PipelineError;

const INCOMPLETE_PATH: &str = "Incomplete path, please select an operation";
const INVALID_REQUEST: &str = "Invalid Request";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<StageOrchestrator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/create", post(create_handler))
        .route("/extend", post(extend_handler))
        .route("/produce", post(produce_handler))
        .route("/events", post(events_handler))
        .fallback(fallback)
        .with_state(state)
}

async fn fallback() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, INCOMPLETE_PATH)
}

fn invalid_request() -> Response {
    (StatusCode::BAD_REQUEST, INVALID_REQUEST).into_response()
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    serde_json::from_slice(body)
        .map_err(|e| tracing::warn!(error = %e, "rejecting malformed request body"))
        .ok()
}

fn reply(status: StatusCode, payload: Value, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"payload": payload, "responseMessage": message.into()})),
    )
        .into_response()
}

fn error_reply(err: &PipelineError) -> Response {
    let status = match err {
        PipelineError::MissingInput => StatusCode::OK,
        _ => {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let message = err.to_string();
    reply(status, json!({"error": message}), format!("ERROR: {}", message))
}

async fn create_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(request) = parse_body::<CreateRequest>(&body) else {
        return invalid_request();
    };
    let invocation = match Invocation::from_command(StageCommand::Create(request)) {
        Ok(invocation) => invocation,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting create request");
            return invalid_request();
        }
    };
    let id = invocation.podcast_id.clone();

    match state.orchestrator.handle(invocation).await {
        Ok(report) => reply(
            StatusCode::OK,
            json!({
                "workspace": report.workspace,
                "id": id,
                "skeleton": report.skeleton,
            }),
            format!("Creation of {} started in {}", id, report.workspace),
        ),
        Err(e) => error_reply(&e),
    }
}

async fn extend_handler(state: State<AppState>, body: Bytes) -> Response {
    publish_stage(state, &body, Operation::Extend).await
}

async fn produce_handler(state: State<AppState>, body: Bytes) -> Response {
    publish_stage(state, &body, Operation::Produce).await
}

async fn publish_stage(State(state): State<AppState>, body: &[u8], operation: Operation) -> Response {
    let Some(request) = parse_body::<StageRequest>(body) else {
        return invalid_request();
    };
    let command = match operation {
        Operation::Extend => StageCommand::Extend(request),
        Operation::Produce => StageCommand::Produce(request),
        Operation::Create => return invalid_request(),
    };
    let invocation = match Invocation::from_command(command) {
        Ok(invocation) => invocation,
        Err(e) => {
            tracing::warn!(error = %e, operation = %operation, "rejecting stage request");
            return invalid_request();
        }
    };
    let orchestrator = &state.orchestrator;
    let identity = match orchestrator.identity(&invocation.author, invocation.command.context()) {
        Ok(identity) => identity,
        Err(e) => return error_reply(&e),
    };

    if let Err(e) = orchestrator
        .publish(&invocation.author, &invocation.podcast_id, &invocation.command)
        .await
    {
        return error_reply(&e);
    }

    let message = match operation {
        Operation::Extend => "Generating sections",
        _ => "Producing podcast",
    };
    reply(
        StatusCode::OK,
        json!({"user": identity.user, "id": invocation.podcast_id}),
        message,
    )
}

/// Push delivery. Always acknowledged once decoded or rejected, so the bus
/// doesn't redeliver a message that can never succeed.
async fn events_handler(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let message = match EventMessage::from_push_body(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = %e, "dropping undecodable event");
            return StatusCode::NO_CONTENT;
        }
    };
    let entity_id = message.entity_id.clone();
    let operation = message.operation.clone();
    if let Err(e) = state.orchestrator.handle_message(message).await {
        tracing::error!(error = %e, podcast = %entity_id, operation = %operation, "event handling failed");
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackoffConfig, MockBackend};
    use crate::bus::RecordingPublisher;
    use crate::client::CompletionClient;
    use crate::context::StageContext;
    use crate::documents::StaticFetcher;
    use crate::ingress::RequestContext;
    use crate::orchestrator::BusSettings;
    use crate::speech::{MockSynthesizer, SpeechClient, VoiceMap};
    use crate::store::{BlobStore, MemoryBlobStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    struct Fixture {
        router: Router,
        store: Arc<MemoryBlobStore>,
        bus: Arc<RecordingPublisher>,
    }

    fn fixture(llm: MockBackend) -> Fixture {
        let store = Arc::new(MemoryBlobStore::new());
        let bus = Arc::new(RecordingPublisher::new());
        let completions = CompletionClient::builder(Arc::new(llm))
            .backoff(BackoffConfig::none())
            .build();
        let speech = SpeechClient::new(Arc::new(MockSynthesizer::new()), VoiceMap::default());
        let ctx = StageContext::builder(store.clone(), Arc::new(completions), Arc::new(speech))
            .fetcher(Arc::new(StaticFetcher::new().with_document("https://docs/a.txt", "Some essay text.")))
            .build()
            .unwrap();
        let orchestrator = StageOrchestrator::new(Arc::new(ctx), bus.clone(), BusSettings::default());
        Fixture {
            router: create_router(AppState {
                orchestrator: Arc::new(orchestrator),
            }),
            store,
            bus,
        }
    }

    fn scripted() -> MockBackend {
        MockBackend::from_fn(|req| {
            let system = req.system_prompt().unwrap_or_default();
            Ok(if system.contains("podcast planner") {
                "#section 1#\n- Title: Only\n- Ideas: one".to_string()
            } else if system.contains("introduction") {
                "Hello.".to_string()
            } else if system.contains("closure") {
                "Bye.".to_string()
            } else {
                "#summary#\nShort.\n#original statements#\n- quote".to_string()
            })
        })
    }

    fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(router, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let f = fixture(scripted());
        let (status, body) = send(f.router, post_json("/", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, INCOMPLETE_PATH.as_bytes());
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let f = fixture(scripted());
        let (status, body) = send(f.router, post_json("/create", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, INVALID_REQUEST.as_bytes());
    }

    #[tokio::test]
    async fn test_create_runs_stage() {
        let f = fixture(scripted());
        let body = json!({
            "author": "alice",
            "user": "undefined",
            "name": "pod-1",
            "requirements": "keep it under 5 minutes",
            "inputFiles": "https://docs/a.txt",
            "slow": "0"
        });
        let (status, value) = send_json(f.router, post_json("/create", body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["responseMessage"], "Creation of pod-1 started in alice/pod-1");
        assert_eq!(value["payload"]["workspace"], "alice/pod-1");
        assert_eq!(value["payload"]["id"], "pod-1");
        assert_eq!(value["payload"]["skeleton"]["introduction"], "Hello.");
        assert_eq!(value["payload"]["skeleton"]["closure"], "Bye.");
        assert!(f.store.exists("alice/pod-1/podcast_plan.txt").await.unwrap());
        assert_eq!(f.bus.operations(), vec!["extend"]);
    }

    #[tokio::test]
    async fn test_create_without_files() {
        let f = fixture(scripted());
        let body = json!({
            "author": "alice", "name": "pod-1",
            "requirements": "short", "inputFiles": "undefined"
        });
        let (status, value) = send_json(f.router, post_json("/create", body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value,
            json!({"payload": {"error": "No input files"}, "responseMessage": "ERROR: No input files"})
        );
    }

    #[tokio::test]
    async fn test_create_failure_is_500() {
        let f = fixture(MockBackend::fixed("x").failing_first(10));
        let body = json!({
            "author": "alice", "name": "pod-1",
            "requirements": "short", "inputFiles": "https://docs/a.txt"
        });
        let (status, value) = send_json(f.router, post_json("/create", body.to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["responseMessage"].as_str().unwrap().starts_with("ERROR: "));
        assert!(value["payload"]["error"].is_string());
        assert!(f.bus.messages().is_empty());
    }

    #[tokio::test]
    async fn test_extend_publishes_event() {
        let f = fixture(scripted());
        let body = json!({
            "author": "#spokeAgent#", "user": "undefined",
            "name": "pod-1", "conversationId": "abc.123", "slow": "1"
        });
        let (status, value) = send_json(f.router, post_json("/extend", body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["responseMessage"], "Generating sections");
        assert_eq!(value["payload"], json!({"user": "abc", "id": "pod-1"}));

        let messages = f.bus.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].operation, "extend");
        assert_eq!(messages[0].entity_id, "pod-1");
        assert!(matches!(messages[0].command().unwrap(), StageCommand::Extend(_)));
    }

    #[tokio::test]
    async fn test_produce_publishes_event() {
        let f = fixture(scripted());
        let body = json!({"author": "bob", "name": "pod-2"});
        let (status, value) = send_json(f.router, post_json("/produce", body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["responseMessage"], "Producing podcast");
        assert_eq!(value["payload"], json!({"user": "bob", "id": "pod-2"}));
        assert_eq!(f.bus.operations(), vec!["produce"]);
    }

    #[tokio::test]
    async fn test_stage_request_without_author_is_invalid() {
        let f = fixture(scripted());
        let (status, _) = send(f.router, post_json("/extend", r#"{"name":"pod-1"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(f.bus.messages().is_empty());
    }

    #[tokio::test]
    async fn test_push_event_runs_stage() {
        let f = fixture(scripted());
        f.store.put_text("alice/pod-1/podcast_plan.txt", "#section 1#\n- Title: Only").await.unwrap();
        f.store.put_text("alice/pod-1/requirements.txt", "short").await.unwrap();

        let command = StageCommand::Extend(StageRequest {
            context: RequestContext::default(),
        });
        let message = EventMessage::new("alice", "spodkast", "pod-1", &command).unwrap();
        let body = message.to_push_body().unwrap().to_string();
        let (status, _) = send(f.router, post_json("/events", body)).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(f.store.exists("alice/pod-1/sections/section1.txt").await.unwrap());
        assert!(f.bus.messages().is_empty());
    }

    #[tokio::test]
    async fn test_push_event_failures_are_acknowledged() {
        let f = fixture(scripted());
        let (status, _) = send(f.router.clone(), post_json("/events", "garbage")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // extend without a stored plan fails inside the stage
        let command = StageCommand::Extend(StageRequest::default());
        let message = EventMessage::new("alice", "spodkast", "pod-9", &command).unwrap();
        let body = serde_json::to_string(&message).unwrap();
        let (status, _) = send(f.router, post_json("/events", body)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
