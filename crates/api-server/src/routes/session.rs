//! Session API endpoints
//!
//! Session lifecycle, context, the message turn and the read-only views over
//! a session's event log.

use agent_runner::network::DEFAULT_AGENT_NAME;
use agent_runner::{AgentSpec, MessageRequest, MessageResponse, RuntimeError};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use convo_core::event::{Event, EventDraft};
use convo_core::session::UsageTotals;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{bad_request, internal_error, RouteError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub overlay: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub agent_name: String,
    pub model: String,
    pub tools: Vec<String>,
    pub overlay: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub ok: bool,
    pub session_id: String,
    pub context: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub session_id: String,
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub agent: Option<AgentSpec>,
    #[serde(default)]
    pub client_message_id: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveAgentRequest {
    pub session_id: String,
    pub agent_name: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub items: Vec<Event>,
    pub length: usize,
}

/// Resolved starting point of a new session
struct PreparedSession {
    agent_name: String,
    model: String,
    tools: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sdk/session/create - Create (or reuse) a session and report its starting agent
async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Json<CreateSessionResponse> {
    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let requested = req
        .agent_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string());
    let model = req
        .model
        .unwrap_or_else(|| state.config().default_model.clone());
    let spec = AgentSpec {
        name: Some(requested.clone()),
        instructions: req.instructions,
        model: Some(model.clone()),
    };

    let prepared = tokio::time::timeout(
        state.config().create_timeout,
        prepare_session(&state, &session_id, &spec, req.scenario_id.as_deref()),
    )
    .await;

    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(_) => {
            warn!("Session create timed out for {}", session_id);
            state
                .store()
                .append(&session_id, EventDraft::log("create_timeout").agent(&requested))
                .await;
            PreparedSession {
                agent_name: requested,
                model,
                tools: Vec::new(),
            }
        }
    };

    info!(
        "Session {} ready on agent {} ({} tools)",
        session_id,
        prepared.agent_name,
        prepared.tools.len()
    );

    Json(CreateSessionResponse {
        session_id,
        agent_name: prepared.agent_name,
        model: prepared.model,
        tools: prepared.tools,
        overlay: req.overlay,
    })
}

async fn prepare_session(
    state: &AppState,
    session_id: &str,
    spec: &AgentSpec,
    scenario_id: Option<&str>,
) -> PreparedSession {
    let orchestrator = state.orchestrator();
    let session = orchestrator
        .ensure_session(session_id, spec.name.as_deref(), scenario_id)
        .await;
    let network = orchestrator.build_network(
        session_id,
        session.scenario_id.as_deref(),
        &session.context,
        spec,
    );
    let start = session
        .active_agent_id
        .clone()
        .unwrap_or_else(|| network.default_root.clone());

    match network.resolve(&start) {
        Some(agent) => PreparedSession {
            agent_name: agent.name.clone(),
            model: agent.model.clone(),
            tools: agent.tool_names(),
        },
        None => PreparedSession {
            agent_name: start,
            model: spec.model.clone().unwrap_or_default(),
            tools: Vec::new(),
        },
    }
}

/// POST /sdk/session/delete - Drop a session and its events
async fn delete_session(
    State(state): State<AppState>,
    Json(req): Json<DeleteSessionRequest>,
) -> Json<OkResponse> {
    if state.store().delete_session(&req.session_id).await {
        info!("Deleted session {}", req.session_id);
    }
    Json(OkResponse { ok: true })
}

/// GET /sdk/session/context - Read the session context
async fn get_context(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<ContextResponse> {
    let context = state.store().get_context(&query.session_id).await;
    Json(ContextResponse {
        ok: true,
        session_id: query.session_id,
        context,
    })
}

/// POST /sdk/session/context - Shallow-merge keys into the session context
async fn set_context(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(patch): Json<Map<String, Value>>,
) -> Json<ContextResponse> {
    let context = state.store().set_context(&query.session_id, patch).await;
    Json(ContextResponse {
        ok: true,
        session_id: query.session_id,
        context,
    })
}

/// POST /sdk/session/message - Run one user message through the agent network
async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, RouteError> {
    if req.user_input.trim().is_empty() {
        return Err(bad_request("user_input cannot be empty"));
    }

    let response = state
        .orchestrator()
        .handle_message(MessageRequest {
            session_id: req.session_id,
            user_input: req.user_input,
            agent: req.agent.unwrap_or_default(),
            client_message_id: req.client_message_id,
            scenario_id: req.scenario_id,
        })
        .await
        .map_err(message_error)?;

    Ok(Json(response))
}

/// POST /sdk/session/set_active_agent - Manually switch the active agent
async fn set_active_agent(
    State(state): State<AppState>,
    Json(req): Json<SetActiveAgentRequest>,
) -> Result<Json<OkResponse>, RouteError> {
    let agent_name = req.agent_name.trim();
    if agent_name.is_empty() {
        return Err(bad_request("agent_name cannot be empty"));
    }

    state
        .orchestrator()
        .set_active_agent(&req.session_id, agent_name)
        .await;
    Ok(Json(OkResponse { ok: true }))
}

/// GET /sdk/session/transcript - Every event of the session
async fn get_transcript(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<TranscriptResponse> {
    let items = state.store().list_events(&query.session_id, None).await;
    Json(TranscriptResponse {
        session_id: query.session_id,
        length: items.len(),
        items,
    })
}

/// GET /sdk/session/usage - Accumulated token usage
async fn get_usage(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<UsageTotals> {
    Json(state.store().get_usage(&query.session_id).await)
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sdk/session/create", post(create_session))
        .route("/sdk/session/delete", post(delete_session))
        .route("/sdk/session/context", get(get_context).post(set_context))
        .route("/sdk/session/message", post(send_message))
        .route("/sdk/session/set_active_agent", post(set_active_agent))
        .route("/sdk/session/transcript", get(get_transcript))
        .route("/sdk/session/usage", get(get_usage))
}

// ============================================================================
// Helpers
// ============================================================================

fn message_error(err: RuntimeError) -> RouteError {
    match err {
        RuntimeError::InvalidInput { message } => bad_request(message),
        other => internal_error(other),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
        Router,
    };
    use convo_core::event::{EventRole, EventType};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::{test_state, AppState};

    fn app(state: &AppState) -> Router {
        super::router().with_state(state.clone())
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn create(state: &AppState, session_id: &str, agent: &str) -> Value {
        let response = post_json(
            app(state),
            "/sdk/session/create",
            json!({
                "session_id": session_id,
                "agent_name": agent,
                "instructions": "help",
                "model": "gpt-4.1-mini",
                "scenario_id": "default"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await
    }

    #[tokio::test]
    async fn create_resolves_scenario_agent_and_tools() {
        let state = test_state();

        let json = create(&state, "s-create", "sales").await;
        assert_eq!(json["session_id"], "s-create");
        assert_eq!(json["agent_name"], "sales");
        let tools: Vec<String> = serde_json::from_value(json["tools"].clone()).unwrap();
        assert!(tools.contains(&"product_search".to_string()));
        assert!(tools.contains(&"catalog_search".to_string()));
    }

    #[tokio::test]
    async fn create_with_unknown_agent_starts_on_root() {
        let state = test_state();

        let json = create(&state, "s-root", "assistant").await;
        assert_eq!(json["agent_name"], "general");

        let session = state.store().get_session("s-root").await.unwrap();
        assert_eq!(session.active_agent_id.as_deref(), Some("general"));
        assert_eq!(session.scenario_id.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn create_without_id_generates_one() {
        let state = test_state();

        let response = post_json(
            app(&state),
            "/sdk/session/create",
            json!({ "agent_name": "helper", "overlay": "retail" }),
        )
        .await;
        let json = read_json(response).await;

        let session_id = json["session_id"].as_str().unwrap();
        assert!(!session_id.is_empty());
        assert_eq!(json["agent_name"], "helper");
        assert_eq!(json["overlay"], "retail");
        assert!(state.store().get_session(session_id).await.is_some());
    }

    #[tokio::test]
    async fn message_rejects_blank_input() {
        let state = test_state();

        let response = post_json(
            app(&state),
            "/sdk/session/message",
            json!({ "session_id": "s-blank", "user_input": "   " }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = read_json(response).await;
        assert_eq!(json["error"], "user_input cannot be empty");
        assert!(state.store().list_events("s-blank", None).await.is_empty());
    }

    #[tokio::test]
    async fn message_is_always_answered() {
        let state = test_state();

        let response = post_json(
            app(&state),
            "/sdk/session/message",
            json!({ "session_id": "s-bare", "user_input": "hello there" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert!(!json["final_output"].as_str().unwrap().trim().is_empty());

        let events = state.store().list_events("s-bare", None).await;
        let reply = events
            .iter()
            .rev()
            .find(|event| event.event_type == EventType::Message)
            .unwrap();
        assert_eq!(reply.role, EventRole::Assistant);
        assert!(reply.is_final);
        assert_eq!(reply.text.as_deref(), json["final_output"].as_str());
    }

    #[tokio::test]
    async fn widget_request_hands_off_to_sales() {
        let state = test_state();
        create(&state, "s-widget", "general").await;

        let response = post_json(
            app(&state),
            "/sdk/session/message",
            json!({ "session_id": "s-widget", "user_input": "I want to buy a widget" }),
        )
        .await;
        let json = read_json(response).await;
        assert!(!json["final_output"].as_str().unwrap().is_empty());

        let session = state.store().get_session("s-widget").await.unwrap();
        assert_eq!(session.active_agent_id.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn repeated_client_message_id_replays() {
        let state = test_state();
        create(&state, "s-replay", "general").await;
        let body = json!({
            "session_id": "s-replay",
            "user_input": "hello",
            "client_message_id": "client-1"
        });

        let first = read_json(post_json(app(&state), "/sdk/session/message", body.clone()).await).await;
        let count = state.store().list_events("s-replay", None).await.len();
        let second = read_json(post_json(app(&state), "/sdk/session/message", body).await).await;

        assert_eq!(first["final_output"], second["final_output"]);
        assert_eq!(second["new_items_len"], 0);
        assert_eq!(state.store().list_events("s-replay", None).await.len(), count);
    }

    #[tokio::test]
    async fn set_active_agent_records_override() {
        let state = test_state();
        create(&state, "s-switch", "general").await;

        let response = post_json(
            app(&state),
            "/sdk/session/set_active_agent",
            json!({ "session_id": "s-switch", "agent_name": "support" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["ok"], true);

        let overrides: Vec<_> = state
            .store()
            .list_events("s-switch", None)
            .await
            .into_iter()
            .filter(|event| event.event_type == EventType::HandoffOverride)
            .collect();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].data["from_agent"], "general");
        assert_eq!(overrides[0].data["to_agent"], "support");
    }

    #[tokio::test]
    async fn set_active_agent_requires_name() {
        let state = test_state();

        let response = post_json(
            app(&state),
            "/sdk/session/set_active_agent",
            json!({ "session_id": "s-switch", "agent_name": " " }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn context_merges_and_reads_back() {
        let state = test_state();

        let response = post_json(
            app(&state),
            "/sdk/session/context?session_id=s-ctx",
            json!({ "roles": ["sales"], "max_hops": 2 }),
        )
        .await;
        assert_eq!(read_json(response).await["context"]["max_hops"], 2);

        post_json(
            app(&state),
            "/sdk/session/context?session_id=s-ctx",
            json!({ "max_hops": 4 }),
        )
        .await;

        let json = read_json(get(app(&state), "/sdk/session/context?session_id=s-ctx").await).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["context"]["roles"], json!(["sales"]));
        assert_eq!(json["context"]["max_hops"], 4);
    }

    #[tokio::test]
    async fn transcript_and_usage_follow_messages() {
        let state = test_state();
        create(&state, "s-usage", "general").await;
        post_json(
            app(&state),
            "/sdk/session/message",
            json!({ "session_id": "s-usage", "user_input": "hello" }),
        )
        .await;

        let transcript =
            read_json(get(app(&state), "/sdk/session/transcript?session_id=s-usage").await).await;
        let items = transcript["items"].as_array().unwrap();
        assert_eq!(transcript["length"], items.len());
        assert_eq!(items[0]["seq"], 1);

        let usage = read_json(get(app(&state), "/sdk/session/usage?session_id=s-usage").await).await;
        assert!(usage["requests"].as_u64().unwrap() >= 1);
        assert_eq!(
            usage["total_tokens"].as_u64().unwrap(),
            usage["input_tokens"].as_u64().unwrap() + usage["output_tokens"].as_u64().unwrap()
        );
    }

    #[tokio::test]
    async fn delete_drops_events() {
        let state = test_state();
        create(&state, "s-del", "general").await;
        state
            .store()
            .append("s-del", convo_core::event::EventDraft::log("note"))
            .await;

        let response = post_json(app(&state), "/sdk/session/delete", json!({ "session_id": "s-del" })).await;
        assert_eq!(read_json(response).await["ok"], true);
        assert!(state.store().list_events("s-del", None).await.is_empty());
        assert!(state.store().get_session("s-del").await.is_none());
    }
}
