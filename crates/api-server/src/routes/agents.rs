//! Scenario and agent endpoints
//!
//! Read-only views over the scenario registry and the agent network built
//! from it, plus the Graphviz visualization.

use agent_runner::{AgentNetwork, AgentSpec, RootDecision};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use convo_core::scenario::{ScenarioDefinition, DEFAULT_SCENARIO_ID};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::{info, warn};

use super::{not_found, RouteError};
use crate::state::AppState;
use crate::viz::{self, OutputFormat};

const VISUALIZE_SESSION: &str = "visualize";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ScenarioSummary {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub default_root: String,
    pub agents: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentsQuery {
    #[serde(default)]
    pub scenario_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentView {
    pub name: String,
    pub role: String,
    pub model: String,
    pub tools: Vec<String>,
    pub handoff_targets: Vec<String>,
    pub agent_tools: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentToolsResponse {
    pub agent: String,
    pub allowed_tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrchestrateRequest {
    pub scenario_id: String,
    #[serde(default)]
    pub last_user_text: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisualizeRequest {
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub root_agent: Option<String>,
    #[serde(default)]
    pub return_dot: bool,
    #[serde(default)]
    pub output_format: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct VisualizeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dot_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl VisualizeResponse {
    fn failed(error: impl Into<String>, hint: Option<&str>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            hint: hint.map(str::to_string),
            ..Self::default()
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /sdk/scenarios - List registered scenarios
async fn list_scenarios(State(state): State<AppState>) -> Json<Vec<ScenarioSummary>> {
    Json(
        state
            .scenarios()
            .list()
            .map(|scenario| ScenarioSummary {
                id: scenario.id.clone(),
                label: scenario.label.clone(),
                description: scenario.description.clone(),
                default_root: scenario.default_root.clone(),
                agents: scenario.agent_names(),
            })
            .collect(),
    )
}

/// GET /sdk/scenarios/{id} - Full scenario definition
async fn get_scenario(
    State(state): State<AppState>,
    Path(scenario_id): Path<String>,
) -> Result<Json<ScenarioDefinition>, RouteError> {
    state
        .scenarios()
        .get(&scenario_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("Scenario not found"))
}

/// GET /sdk/agents - Agents of a scenario as wired at runtime
async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<AgentsQuery>,
) -> Result<Json<Vec<AgentView>>, RouteError> {
    let scenario_id = query.scenario_id.as_deref().unwrap_or(DEFAULT_SCENARIO_ID);
    if state.scenarios().get(scenario_id).is_none() {
        return Err(not_found("Scenario not found"));
    }

    let network = scenario_network(&state, scenario_id);
    Ok(Json(
        network
            .agents()
            .iter()
            .map(|agent| AgentView {
                name: agent.name.clone(),
                role: agent.role.clone(),
                model: agent.model.clone(),
                tools: agent.tool_names(),
                handoff_targets: agent.handoffs.iter().map(|edge| edge.target.clone()).collect(),
                agent_tools: agent.agent_tools.iter().map(|tool| tool.name.clone()).collect(),
            })
            .collect(),
    ))
}

/// GET /sdk/agents/{agent}/tools - Tools a scenario agent may call
///
/// The agent name matches case-insensitively.
async fn agent_tools(
    State(state): State<AppState>,
    Path(agent): Path<String>,
    Query(query): Query<AgentsQuery>,
) -> Result<Json<AgentToolsResponse>, RouteError> {
    let scenario_id = query.scenario_id.as_deref().unwrap_or(DEFAULT_SCENARIO_ID);
    let scenario = state
        .scenarios()
        .get(scenario_id)
        .ok_or_else(|| not_found("Scenario not found"))?;
    let definition = scenario
        .agent(&agent)
        .or_else(|| {
            scenario
                .agents
                .iter()
                .find(|candidate| candidate.name.eq_ignore_ascii_case(&agent))
        })
        .ok_or_else(|| not_found("Agent not found"))?;

    Ok(Json(AgentToolsResponse {
        agent: definition.name.clone(),
        allowed_tools: definition.tools.clone(),
    }))
}

/// POST /sdk/orchestrate - Let the scenario supervisor pick the root agent
async fn orchestrate(
    State(state): State<AppState>,
    Json(req): Json<OrchestrateRequest>,
) -> Json<RootDecision> {
    let decision = state
        .orchestrator()
        .choose_root(
            &req.scenario_id,
            req.last_user_text.as_deref().unwrap_or_default(),
            req.session_id.as_deref(),
        )
        .await;
    info!(
        "Supervisor decision for scenario {}: {:?} ({})",
        req.scenario_id, decision.chosen_root, decision.reason
    );
    Json(decision)
}

/// POST /sdk/agents/visualize - Render a scenario's agent network
///
/// Always answers 200; failures come back as `ok: false` with a hint.
async fn visualize(
    State(state): State<AppState>,
    Json(req): Json<VisualizeRequest>,
) -> Json<VisualizeResponse> {
    let format = match OutputFormat::parse(req.output_format.as_deref()) {
        Ok(format) => format,
        Err(err) => return Json(VisualizeResponse::failed(err.to_string(), Some(err.hint()))),
    };

    let scenario_id = req.scenario_id.as_deref().unwrap_or(DEFAULT_SCENARIO_ID);
    if state.scenarios().get(scenario_id).is_none() {
        return Json(VisualizeResponse::failed("No scenario/agents to visualize", None));
    }

    let network = scenario_network(&state, scenario_id);
    if network.agents().is_empty() {
        return Json(VisualizeResponse::failed("No scenario/agents to visualize", None));
    }

    let root = req
        .root_agent
        .as_deref()
        .and_then(|name| network.get(name))
        .map(|agent| agent.name.clone())
        .unwrap_or_else(|| network.default_root.clone());
    let dot = viz::network_dot(&network, &root);

    if format == OutputFormat::Dot {
        return Json(VisualizeResponse {
            ok: true,
            format: Some(format.as_str().to_string()),
            dot_source: Some(dot),
            ..VisualizeResponse::default()
        });
    }

    match viz::render(&state.config().graphviz_dot, &dot, format).await {
        Ok(image) => Json(VisualizeResponse {
            ok: true,
            format: Some(format.as_str().to_string()),
            image_base64: Some(STANDARD.encode(image)),
            dot_source: req.return_dot.then_some(dot),
            ..VisualizeResponse::default()
        }),
        Err(err) => {
            warn!("Graph render failed for scenario {}: {}", scenario_id, err);
            let mut response = VisualizeResponse::failed(err.to_string(), Some(err.hint()));
            if req.return_dot {
                response.dot_source = Some(dot);
            }
            Json(response)
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sdk/scenarios", get(list_scenarios))
        .route("/sdk/scenarios/{id}", get(get_scenario))
        .route("/sdk/agents", get(list_agents))
        .route("/sdk/agents/visualize", post(visualize))
        .route("/sdk/agents/{agent}/tools", get(agent_tools))
        .route("/sdk/orchestrate", post(orchestrate))
}

fn scenario_network(state: &AppState, scenario_id: &str) -> AgentNetwork {
    state.orchestrator().build_network(
        VISUALIZE_SESSION,
        Some(scenario_id),
        &Map::new(),
        &AgentSpec::default(),
    )
}
