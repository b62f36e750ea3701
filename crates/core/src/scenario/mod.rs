//! Scenario and agent definitions

mod model;
mod registry;

pub use model::{AgentDefinition, ScenarioDefinition, SUPERVISOR_ROLE};
pub use registry::{ScenarioRegistry, DEFAULT_SCENARIO_ID};
