//! Tool registry endpoints
//!
//! Listing, role-filtered catalog and direct execution of registered tools.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use convo_core::scenario::DEFAULT_SCENARIO_ID;
use convo_core::tool::{ToolDescriptor, ToolSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    /// Comma-separated role list
    #[serde(default)]
    pub roles: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteToolResponse {
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ExecuteToolResponse {
    fn failed(req: ExecuteToolRequest, error: String) -> Self {
        Self {
            tool: req.tool,
            success: false,
            output: None,
            error: Some(error),
            correlation_id: req.correlation_id,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /sdk/tools/catalog - Tool descriptors, filtered by `roles` when given
async fn tool_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Json<Vec<ToolDescriptor>> {
    let roles: Option<Vec<String>> = query.roles.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect()
    });
    Json(state.tools().catalog(roles.as_deref()))
}

/// GET /sdk/tools/list - Name, description and parameter schema of every tool
async fn tool_list(State(state): State<AppState>) -> Json<Vec<ToolSummary>> {
    Json(state.tools().summaries())
}

/// POST /sdk/tools/execute - Invoke a tool directly
///
/// When both the session and scenario are known, the session's active agent
/// must list the tool.
async fn execute_tool(
    State(state): State<AppState>,
    Query(query): Query<ExecuteQuery>,
    Json(req): Json<ExecuteToolRequest>,
) -> Json<ExecuteToolResponse> {
    let Some(tool) = state.tools().get(&req.tool).cloned() else {
        let error = format!("Unknown tool '{}'", req.tool);
        return Json(ExecuteToolResponse::failed(req, error));
    };

    let session = match &query.session_id {
        Some(session_id) => state.store().get_session(session_id).await,
        None => None,
    };
    let scenario_id = query.scenario_id.as_deref().unwrap_or(DEFAULT_SCENARIO_ID);

    if let (Some(session), Some(scenario)) = (&session, state.scenarios().get(scenario_id)) {
        let definition = session
            .active_agent_id
            .as_deref()
            .and_then(|name| scenario.agent(name));
        if let Some(definition) = definition {
            if !definition.tools.is_empty() && !definition.tools.contains(&req.tool) {
                debug!(
                    "Rejected tool {} for agent {} in session {}",
                    req.tool, definition.name, session.session_id
                );
                let error = format!(
                    "Tool '{}' not allowed for agent '{}'",
                    req.tool, definition.name
                );
                return Json(ExecuteToolResponse::failed(req, error));
            }
        }
    }

    let (session_id, context) = match session {
        Some(session) => (session.session_id, session.context),
        None => (query.session_id.unwrap_or_default(), Map::new()),
    };
    let ctx = state.tool_context(&session_id, context);

    match tool.invoke(&ctx, &Value::Object(req.args.clone())) {
        Ok(envelope) => Json(ExecuteToolResponse {
            tool: req.tool,
            success: true,
            output: Some(envelope.to_value()),
            error: None,
            correlation_id: req.correlation_id,
        }),
        Err(err) => {
            warn!("Tool {} failed: {}", req.tool, err);
            Json(ExecuteToolResponse::failed(req, err.to_string()))
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sdk/tools/catalog", get(tool_catalog))
        .route("/sdk/tools/list", get(tool_list))
        .route("/sdk/tools/execute", post(execute_tool))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::{test_state, AppState};

    fn app(state: &AppState) -> Router {
        super::router().with_state(state.clone())
    }

    async fn read_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn execute(state: &AppState, uri: &str, body: Value) -> Value {
        let response = app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await
    }

    fn names(json: &Value) -> Vec<String> {
        json.as_array()
            .unwrap()
            .iter()
            .map(|item| item["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn catalog_filters_by_roles() {
        let state = test_state();

        let response = app(&state)
            .oneshot(
                Request::builder()
                    .uri("/sdk/tools/catalog?roles=support")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let support = names(&read_json(response).await);
        assert!(support.contains(&"ticket_search".to_string()));
        assert!(support.contains(&"echo_context".to_string()));
        assert!(!support.contains(&"product_search".to_string()));

        let response = app(&state)
            .oneshot(
                Request::builder()
                    .uri("/sdk/tools/catalog?roles=support,%20sales")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let both = names(&read_json(response).await);
        assert!(both.contains(&"product_search".to_string()));
    }

    #[tokio::test]
    async fn catalog_without_roles_lists_everything() {
        let state = test_state();

        let response = app(&state)
            .oneshot(Request::builder().uri("/sdk/tools/catalog").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let all = read_json(response).await;
        assert_eq!(all.as_array().unwrap().len(), state.tools().list().len());
        assert!(all[0].get("roles_allowed").is_some());
    }

    #[tokio::test]
    async fn list_includes_params() {
        let state = test_state();

        let response = app(&state)
            .oneshot(Request::builder().uri("/sdk/tools/list").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = read_json(response).await;
        let weather = json
            .as_array()
            .unwrap()
            .iter()
            .find(|item| item["name"] == "weather")
            .unwrap();
        assert_eq!(weather["params"]["required"], json!(["city"]));
    }

    #[tokio::test]
    async fn execute_returns_envelope() {
        let state = test_state();

        let json = execute(
            &state,
            "/sdk/tools/execute",
            json!({ "tool": "weather", "args": { "city": "Oslo" }, "correlation_id": "c-1" }),
        )
        .await;
        assert_eq!(json["success"], true);
        assert_eq!(json["correlation_id"], "c-1");
        assert_eq!(json["output"]["ok"], true);
        assert_eq!(json["output"]["data"]["city"], "Oslo");
    }

    #[tokio::test]
    async fn execute_reports_validation_errors() {
        let state = test_state();

        let json = execute(&state, "/sdk/tools/execute", json!({ "tool": "weather", "args": {} })).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("city"));

        let json = execute(&state, "/sdk/tools/execute", json!({ "tool": "nope" })).await;
        assert_eq!(json["success"], false);
        assert!(json.get("output").is_none());
    }

    #[tokio::test]
    async fn execute_enforces_active_agent_tools() {
        let state = test_state();
        state
            .orchestrator()
            .ensure_session("s-tools", Some("general"), Some("default"))
            .await;

        let json = execute(
            &state,
            "/sdk/tools/execute?session_id=s-tools&scenario_id=default",
            json!({ "tool": "product_search", "args": { "query": "widget" } }),
        )
        .await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Tool 'product_search' not allowed for agent 'general'");

        let json = execute(
            &state,
            "/sdk/tools/execute?session_id=s-tools&scenario_id=default",
            json!({ "tool": "echo_context", "args": { "text": "hi" } }),
        )
        .await;
        assert_eq!(json["success"], true);
    }
}
