use std::collections::BTreeMap;

use super::model::{AgentDefinition, ScenarioDefinition, SUPERVISOR_ROLE};

pub const DEFAULT_SCENARIO_ID: &str = "default";
const BASE_MODEL: &str = "gpt-4.1-mini";

/// Immutable scenario lookup, built once at startup
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<String, ScenarioDefinition>,
}

impl ScenarioRegistry {
    pub fn new(scenarios: impl IntoIterator<Item = ScenarioDefinition>) -> Self {
        Self {
            scenarios: scenarios
                .into_iter()
                .map(|scenario| (scenario.id.clone(), scenario))
                .collect(),
        }
    }

    /// The retail and project-planning demo scenarios.
    pub fn builtin() -> Self {
        Self::new([retail_scenario(), project_planning_scenario()])
    }

    pub fn get(&self, scenario_id: &str) -> Option<&ScenarioDefinition> {
        self.scenarios.get(scenario_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &ScenarioDefinition> {
        self.scenarios.values()
    }
}

fn retail_scenario() -> ScenarioDefinition {
    ScenarioDefinition {
        id: DEFAULT_SCENARIO_ID.to_string(),
        label: "Default (Retail)".to_string(),
        default_root: "general".to_string(),
        description: Some("General assistant with sales and support specialists".to_string()),
        agents: vec![
            AgentDefinition::new(
                "supervisor",
                BASE_MODEL,
                "You are a routing supervisor. Read the user's last message and pick the best specialist. \
                 Prefer Sales for product discovery and recommendations, Support for troubleshooting, \
                 and General otherwise. Switch only when it clearly helps the user and give a short reason.",
            )
            .role(SUPERVISOR_ROLE)
            .handoffs(&["general", "sales", "support"]),
            AgentDefinition::new(
                "general",
                BASE_MODEL,
                "General purpose assistant. If the user asks for Sales or Support, hand off to that agent \
                 right away with a short reason.",
            )
            .voice("alloy")
            .tools(&["echo_context", "weather", "web_search"])
            .handoffs(&["sales", "support"]),
            AgentDefinition::new(
                "sales",
                BASE_MODEL,
                "You are a sales assistant. Ask short clarifying questions and recommend catalog items \
                 using product_search.",
            )
            .tools(&["product_search", "catalog_search"])
            .handoffs(&["support", "general"]),
            AgentDefinition::new(
                "support",
                BASE_MODEL,
                "You are a support assistant. Diagnose issues step by step, ask for minimal repro details \
                 and number your steps.",
            )
            .tools(&["echo_context", "ticket_search", "order_lookup"])
            .handoffs(&["sales", "general"]),
            AgentDefinition::new(
                "summarizer",
                BASE_MODEL,
                "You are a concise summarizer. Return a brief factual summary with the key points.",
            )
            .handoffs(&["general"]),
        ],
    }
}

fn project_planning_scenario() -> ScenarioDefinition {
    ScenarioDefinition {
        id: "project_planning".to_string(),
        label: "Project Planning".to_string(),
        default_root: "planner".to_string(),
        description: Some("Planner and estimator pair for breaking down work".to_string()),
        agents: vec![
            AgentDefinition::new(
                "planner",
                BASE_MODEL,
                "You are a project planning assistant. Break work into tasks, find dependencies and \
                 suggest timelines.",
            )
            .tools(&["echo_context", "project_tasks"])
            .handoffs(&["estimator", "general"]),
            AgentDefinition::new(
                "estimator",
                BASE_MODEL,
                "You estimate work effort. Give rough order-of-magnitude estimates and state assumptions.",
            )
            .tools(&["echo_context"])
            .handoffs(&["planner", "general"]),
            AgentDefinition::new(
                "general",
                BASE_MODEL,
                "General helper for planning. If the user asks for the planner or estimator, hand off to it.",
            )
            .tools(&["echo_context"])
            .handoffs(&["planner", "estimator"]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_default_scenario() {
        let registry = ScenarioRegistry::builtin();
        let scenario = registry.get("default").unwrap();

        assert_eq!(scenario.default_root, "general");
        assert_eq!(
            scenario.agent_names(),
            vec!["supervisor", "general", "sales", "support", "summarizer"]
        );
        assert_eq!(scenario.orchestrator().unwrap().name, "supervisor");
    }

    #[test]
    fn test_handoff_targets_resolve_within_scenario() {
        let registry = ScenarioRegistry::builtin();
        for scenario in registry.list() {
            assert!(scenario.has_agent(&scenario.default_root));
            for agent in &scenario.agents {
                for target in &agent.handoff_targets {
                    assert!(scenario.has_agent(target), "{} -> {}", agent.name, target);
                }
            }
        }
    }

    #[test]
    fn test_orchestrator_falls_back_to_default_root() {
        let registry = ScenarioRegistry::builtin();
        let scenario = registry.get("project_planning").unwrap();
        assert_eq!(scenario.orchestrator().unwrap().name, "planner");
        assert!(registry.get("missing").is_none());
    }
}
