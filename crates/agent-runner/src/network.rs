//! Runtime agent network construction
//!
//! A network is rebuilt for every turn from the static scenario definition,
//! the session context and the tool registry. Nothing here is cached across
//! requests.

use std::collections::HashMap;
use std::sync::Arc;

use convo_core::event::{Event, EventDraft, EventRole, EventType};
use convo_core::scenario::{AgentDefinition, ScenarioDefinition, ScenarioRegistry};
use convo_core::session::{context_roles, EventStore};
use convo_core::tool::{ToolRegistry, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

pub const DEFAULT_AGENT_NAME: &str = "assistant";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const AGENT_TOOL_SUFFIX: &str = "_agent_tool";

/// Caller-supplied agent override for sessions without a scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Writes `handoff_suggestion` events when the runtime proposes a handoff
#[derive(Debug, Clone)]
pub struct HandoffRecorder {
    store: Arc<EventStore>,
    session_id: String,
}

impl HandoffRecorder {
    pub fn new(store: Arc<EventStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    pub async fn record(
        &self,
        from_agent: &str,
        to_agent: &str,
        reason: Option<&str>,
        recommended_prompts: Option<Vec<String>>,
    ) -> Event {
        let mut draft = EventDraft::new(EventType::HandoffSuggestion, EventRole::System)
            .agent(to_agent)
            .reason(reason.filter(|r| !r.trim().is_empty()).unwrap_or("llm_handoff"))
            .with_data("from_agent", json!(from_agent))
            .with_data("to_agent", json!(to_agent));
        if let Some(prompts) = recommended_prompts.filter(|p| !p.is_empty()) {
            draft = draft.with_data("recommended_prompts", json!(prompts));
        }
        debug!(
            "Handoff suggested in session {}: {} -> {}",
            self.session_id, from_agent, to_agent
        );
        self.store.append(&self.session_id, draft).await
    }
}

/// A native handoff from one agent to a declared target
#[derive(Debug, Clone)]
pub struct HandoffEdge {
    pub from: String,
    pub target: String,
    recorder: HandoffRecorder,
}

impl HandoffEdge {
    /// Called by a runtime when the model decides to hand off. Records a
    /// suggestion only; the orchestrator decides whether to apply it.
    pub async fn invoke(&self, reason: Option<&str>, recommended_prompts: Option<Vec<String>>) -> Event {
        self.recorder
            .record(&self.from, &self.target, reason, recommended_prompts)
            .await
    }
}

/// Another agent exposed as a callable tool to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentTool {
    pub name: String,
    pub description: String,
    pub agent: String,
}

impl AgentTool {
    fn for_agent(agent: &str) -> Self {
        Self {
            name: format!("{}{}", agent, AGENT_TOOL_SUFFIX),
            description: format!("Call the {} agent for a subtask and return the result.", agent),
            agent: agent.to_string(),
        }
    }
}

/// A fully resolved agent, ready to hand to a runtime
#[derive(Debug, Clone)]
pub struct RuntimeAgent {
    pub name: String,
    pub role: String,
    pub model: String,
    pub instructions: String,
    pub temperature: f32,
    pub tools: Vec<ToolSpec>,
    pub handoffs: Vec<HandoffEdge>,
    pub agent_tools: Vec<AgentTool>,
}

impl RuntimeAgent {
    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn handoff_to(&self, target: &str) -> Option<&HandoffEdge> {
        self.handoffs.iter().find(|edge| edge.target == target)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name.clone()).collect()
    }
}

/// Per-turn set of runtime agents
#[derive(Debug, Clone)]
pub struct AgentNetwork {
    pub scenario_id: Option<String>,
    pub default_root: String,
    pub orchestrator: Option<String>,
    agents: Vec<RuntimeAgent>,
}

impl AgentNetwork {
    pub fn get(&self, name: &str) -> Option<&RuntimeAgent> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    pub fn agents(&self) -> &[RuntimeAgent] {
        &self.agents
    }

    /// The named agent, else the default root, else the first agent.
    pub fn resolve(&self, name: &str) -> Option<&RuntimeAgent> {
        self.get(name)
            .or_else(|| self.get(&self.default_root))
            .or_else(|| self.agents.first())
    }
}

/// Roles allowed to see an agent-as-tool wrapper, keyed by agent name.
///
/// Parsed from `agent=role1|role2,other=role3`.
#[derive(Debug, Clone, Default)]
pub struct AgentToolAllowlist {
    entries: HashMap<String, Vec<String>>,
}

impl AgentToolAllowlist {
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(',')
            .filter_map(|entry| {
                let (agent, roles) = entry.split_once('=')?;
                let agent = agent.trim();
                if agent.is_empty() {
                    return None;
                }
                let roles: Vec<String> = roles
                    .split('|')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect();
                Some((agent.to_string(), roles))
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the `{agent}_agent_tool` wrapper is enabled for these roles.
    pub fn enables(&self, agent: &str, roles: &[String]) -> bool {
        match self.entries.get(agent) {
            Some(allowed) => allowed.iter().any(|role| roles.contains(role)),
            None => {
                roles.is_empty() || roles.iter().any(|role| role == agent || role == "agents")
            }
        }
    }
}

fn coerce_model(model: Option<&str>, default_model: &str) -> String {
    match model.map(str::trim).filter(|m| !m.is_empty()) {
        Some(model) if model.contains("realtime") => default_model.to_string(),
        Some(model) => model.to_string(),
        None => default_model.to_string(),
    }
}

/// Builds [`AgentNetwork`]s from immutable registries
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    scenarios: Arc<ScenarioRegistry>,
    tools: Arc<ToolRegistry>,
    allowlist: AgentToolAllowlist,
    default_model: String,
}

impl NetworkBuilder {
    pub fn new(scenarios: Arc<ScenarioRegistry>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            scenarios,
            tools,
            allowlist: AgentToolAllowlist::default(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_allowlist(mut self, allowlist: AgentToolAllowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn scenarios(&self) -> &ScenarioRegistry {
        &self.scenarios
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Build the network for a scenario, or a single ad-hoc agent when the
    /// scenario is absent or unknown.
    pub fn build(
        &self,
        scenario_id: Option<&str>,
        context: &Map<String, Value>,
        spec: &AgentSpec,
        recorder: HandoffRecorder,
    ) -> AgentNetwork {
        let Some(scenario) = scenario_id.and_then(|id| self.scenarios.get(id)) else {
            return self.build_adhoc(scenario_id, spec);
        };

        let session_roles = context_roles(context);
        let orchestrator = scenario.orchestrator().map(|agent| agent.name.clone());

        let agent_tools: Vec<AgentTool> = scenario
            .agents
            .iter()
            .filter(|agent| Some(&agent.name) != orchestrator.as_ref())
            .filter(|agent| self.allowlist.enables(&agent.name, &session_roles))
            .map(|agent| AgentTool::for_agent(&agent.name))
            .collect();

        let agents = scenario
            .agents
            .iter()
            .map(|def| {
                let mut agent = self.build_agent(def, &session_roles, &recorder, scenario);
                let is_hub = Some(&def.name) == orchestrator.as_ref() || def.name == scenario.default_root;
                if is_hub {
                    agent.agent_tools = agent_tools
                        .iter()
                        .filter(|tool| tool.agent != def.name)
                        .cloned()
                        .collect();
                }
                agent
            })
            .collect();

        AgentNetwork {
            scenario_id: Some(scenario.id.clone()),
            default_root: scenario.default_root.clone(),
            orchestrator,
            agents,
        }
    }

    fn build_agent(
        &self,
        def: &AgentDefinition,
        session_roles: &[String],
        recorder: &HandoffRecorder,
        scenario: &ScenarioDefinition,
    ) -> RuntimeAgent {
        let mut roles: Vec<String> = session_roles.to_vec();
        for extra in [def.name.as_str(), def.role.as_str(), "agents", DEFAULT_AGENT_NAME] {
            if !roles.iter().any(|r| r == extra) {
                roles.push(extra.to_string());
            }
        }

        let handoffs = def
            .handoff_targets
            .iter()
            .filter(|target| scenario.has_agent(target))
            .map(|target| HandoffEdge {
                from: def.name.clone(),
                target: target.clone(),
                recorder: recorder.clone(),
            })
            .collect();

        RuntimeAgent {
            name: def.name.clone(),
            role: def.role.clone(),
            model: coerce_model(Some(&def.model), &self.default_model),
            instructions: def.instructions.clone(),
            temperature: def.temperature,
            tools: self.tools.resolve(&def.tools, &roles),
            handoffs,
            agent_tools: Vec::new(),
        }
    }

    fn build_adhoc(&self, scenario_id: Option<&str>, spec: &AgentSpec) -> AgentNetwork {
        if let Some(id) = scenario_id {
            debug!("Unknown scenario '{}', using an ad-hoc agent", id);
        }
        let name = spec
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string());
        let instructions = spec
            .instructions
            .clone()
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string());

        let agent = RuntimeAgent {
            name: name.clone(),
            role: DEFAULT_AGENT_NAME.to_string(),
            model: coerce_model(spec.model.as_deref(), &self.default_model),
            instructions,
            temperature: 0.8,
            tools: Vec::new(),
            handoffs: Vec::new(),
            agent_tools: Vec::new(),
        };

        AgentNetwork {
            scenario_id: None,
            default_root: name,
            orchestrator: None,
            agents: vec![agent],
        }
    }
}
