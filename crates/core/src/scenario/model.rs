use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SUPERVISOR_ROLE: &str = "supervisor";
pub const DEFAULT_AGENT_ROLE: &str = "assistant";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Static description of one agent within a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub handoff_targets: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_role() -> String {
    DEFAULT_AGENT_ROLE.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl AgentDefinition {
    pub fn new(name: &str, model: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            role: default_role(),
            instructions: instructions.to_string(),
            voice: None,
            temperature: DEFAULT_TEMPERATURE,
            tools: Vec::new(),
            handoff_targets: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn voice(mut self, voice: &str) -> Self {
        self.voice = Some(voice.to_string());
        self
    }

    pub fn tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn handoffs(mut self, targets: &[&str]) -> Self {
        self.handoff_targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn is_supervisor(&self) -> bool {
        self.role == SUPERVISOR_ROLE
    }
}

/// A named, ordered set of agents with a default entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub label: String,
    pub default_root: String,
    pub agents: Vec<AgentDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ScenarioDefinition {
    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.agent(name).is_some()
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|agent| agent.name.clone()).collect()
    }

    /// The agent with the supervisor role, else the default root.
    pub fn orchestrator(&self) -> Option<&AgentDefinition> {
        self.agents
            .iter()
            .find(|agent| agent.is_supervisor())
            .or_else(|| self.agent(&self.default_root))
    }
}
