//! HTTP front end for the agent.
//!
//! Exposes [`Agent::handle_turn`] over a small JSON API shaped like the
//! LangServe conventions most chat clients already speak.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Health check (status, agent name, model provider) |
//! | `POST` | `/chat` | Run one turn, return the reply and thread id |
//! | `POST` | `/invoke` | Run one turn, return the full thread log |
//! | `POST` | `/stream` | Run one turn, streaming each visited state as SSE |
//!
//! # Requests
//!
//! ```json
//! {
//!   "input": { "messages": [{ "type": "human", "content": "What is our refund policy?" }] },
//!   "config": { "configurable": { "thread_id": "support-42" } }
//! }
//! ```
//!
//! `/chat` takes `messages` at the top level instead of under `input`. The
//! new user input is the last `human` message; a missing thread id is
//! generated and returned in the response.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "upstream_error", "message": "answer synthesis failed: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408), `route_error` (502),
//! `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser chat UIs can
//! talk to the server directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use rag_router_core::orchestrator::{NoopObserver, StepKind, TurnObserver};
use rag_router_core::{ConversationState, Message, Role, ThreadId, TurnError};

use crate::agent::Agent;
use crate::config::Config;

#[derive(Clone)]
struct AppState {
    agent: Arc<Agent>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Builds the agent from `config` first, so missing API keys or an
/// unreadable database fail before the port is bound.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let agent = Agent::from_config(config).await?;
    run_server_with_agent(&config.server.bind, Arc::new(agent)).await
}

/// Starts the HTTP server with an already assembled agent.
///
/// Used by `ragr serve` through [`run_server`] and by tests that wire the
/// agent to stub providers.
pub async fn run_server_with_agent(bind_addr: &str, agent: Arc<Agent>) -> anyhow::Result<()> {
    let app = router(agent);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "server started");
    println!("Agent server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(agent: Arc<Agent>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/invoke", post(handle_invoke))
        .route("/stream", post(handle_stream))
        .layer(cors)
        .with_state(AppState { agent })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        let status = match err.code() {
            "timeout" => StatusCode::REQUEST_TIMEOUT,
            "route_error" | "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ Request / response bodies ============

/// A chat message on the wire: `{"type": "human" | "ai", "content": "..."}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct WireMessage {
    #[serde(rename = "type", alias = "role", default)]
    kind: String,
    #[serde(default)]
    content: String,
}

impl WireMessage {
    fn is_human(&self) -> bool {
        matches!(self.kind.as_str(), "human" | "user")
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let kind = match message.role {
            Role::User => "human",
            Role::Assistant => "ai",
        };
        WireMessage {
            kind: kind.to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RunConfig {
    #[serde(default)]
    configurable: Configurable,
}

#[derive(Debug, Default, Deserialize)]
struct Configurable {
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<WireMessage>,
    #[serde(default)]
    config: Option<RunConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct InvokeInput {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    #[serde(default)]
    input: InvokeInput,
    #[serde(default)]
    config: Option<RunConfig>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    thread_id: String,
}

/// Content of the last human message, or `""` when there is none.
fn last_human_text(messages: &[WireMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.is_human())
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

fn thread_for(config: Option<&RunConfig>) -> ThreadId {
    config
        .and_then(|c| c.configurable.thread_id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ThreadId::new)
        .unwrap_or_else(ThreadId::generate)
}

fn wire_log(state: &ConversationState) -> Vec<WireMessage> {
    state.messages.iter().map(WireMessage::from).collect()
}

// ============ GET / ============

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "agent": "rag-router",
        "provider": state.agent.provider(),
    }))
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload?;
    let thread = thread_for(request.config.as_ref());
    let text = last_human_text(&request.messages);

    let response = state.agent.handle_turn(&thread, &text).await?;

    Ok(Json(ChatResponse {
        response,
        thread_id: thread.to_string(),
    }))
}

// ============ POST /invoke ============

async fn handle_invoke(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let thread = thread_for(request.config.as_ref());
    let text = last_human_text(&request.input.messages);

    let outcome = state
        .agent
        .handle_turn_observed(&thread, &text, &NoopObserver)
        .await?;

    Ok(Json(json!({
        "output": { "messages": wire_log(&outcome.state) },
        "metadata": { "thread_id": thread.as_str() },
    })))
}

// ============ POST /stream ============

/// Forwards every visited state to the SSE channel.
struct ChannelObserver {
    tx: mpsc::UnboundedSender<Value>,
}

impl TurnObserver for ChannelObserver {
    fn on_step(&self, step: StepKind, state: &ConversationState) {
        let mut update = json!({ "messages": wire_log(state) });
        if let Some(route) = state.route {
            update["route"] = json!(route.as_str());
        }
        if let Some(kb) = &state.knowledge_base_text {
            update["knowledge_base_text"] = json!(kb);
        }
        if let Some(web) = &state.web_text {
            update["web_text"] = json!(web);
        }
        let mut data = serde_json::Map::new();
        data.insert(step.node_name().to_string(), update);
        let _ = self.tx.send(json!({ "event": "on_chain_stream", "data": data }));
    }
}

async fn handle_stream(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(request) = payload?;
    let thread = thread_for(request.config.as_ref());
    let text = last_human_text(&request.input.messages);

    let (tx, rx) = mpsc::unbounded_channel();
    let agent = state.agent.clone();
    tokio::spawn(async move {
        let observer = ChannelObserver { tx: tx.clone() };
        let last = match agent.handle_turn_observed(&thread, &text, &observer).await {
            Ok(outcome) => json!({
                "event": "on_chain_end",
                "data": { "response": outcome.answer, "thread_id": thread.as_str() },
            }),
            Err(e) => json!({
                "event": "error",
                "data": { "code": e.code(), "error": e.to_string(), "thread_id": thread.as_str() },
            }),
        };
        let _ = tx.send(last);
    });

    let events = UnboundedReceiverStream::new(rx)
        .map(|payload| Ok(Event::default().data(payload.to_string())));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn human(content: &str) -> WireMessage {
        WireMessage {
            kind: "human".into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_last_human_message_is_input() {
        let messages = vec![
            human("first"),
            WireMessage {
                kind: "ai".into(),
                content: "reply".into(),
            },
            human("second"),
            WireMessage {
                kind: "ai".into(),
                content: "trailing".into(),
            },
        ];
        assert_eq!(last_human_text(&messages), "second");
        assert_eq!(last_human_text(&[]), "");
    }

    #[test]
    fn test_role_alias_accepted() {
        let msg: WireMessage = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert!(msg.is_human());
    }

    #[test]
    fn test_thread_generated_when_missing() {
        let generated = thread_for(None);
        assert_eq!(generated.as_str().len(), 36);

        let blank = RunConfig {
            configurable: Configurable {
                thread_id: Some("  ".into()),
            },
        };
        assert_ne!(thread_for(Some(&blank)).as_str().trim(), "");

        let given = RunConfig {
            configurable: Configurable {
                thread_id: Some("t-1".into()),
            },
        };
        assert_eq!(thread_for(Some(&given)).as_str(), "t-1");
    }

    #[test]
    fn test_turn_errors_map_to_status() {
        let err: AppError = TurnError::ClassificationParse("bad".into()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "route_error");

        let err: AppError = TurnError::Timeout(std::time::Duration::from_secs(1)).into();
        assert_eq!(err.status, StatusCode::REQUEST_TIMEOUT);

        let err: AppError = TurnError::Store(anyhow::anyhow!("disk")).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "internal");
    }
}
