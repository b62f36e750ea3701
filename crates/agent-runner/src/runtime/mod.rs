//! Boundary to the agent runtime that actually talks to a model

mod http;
mod keyword;

pub use http::HttpRuntime;
pub use keyword::KeywordRuntime;

use async_trait::async_trait;
use convo_core::session::UsageDelta;
use convo_core::tool::ToolContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::network::{AgentNetwork, RuntimeAgent};

/// One item produced during a run, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunItem {
    ToolCall {
        tool: String,
        #[serde(default)]
        args: Value,
    },
    ToolOutput {
        tool: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        output: Value,
    },
    Message {
        text: String,
    },
    Handoff {
        target: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        recommended_prompts: Option<Vec<String>>,
    },
}

/// Typed result of one agent run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(default)]
    pub final_output: String,
    #[serde(default)]
    pub items: Vec<RunItem>,
    #[serde(default)]
    pub usage: Option<UsageDelta>,
}

impl RunResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            final_output: text.into(),
            ..Self::default()
        }
    }
}

/// Everything a runtime may consult during a run
pub struct TurnContext<'a> {
    pub session_id: &'a str,
    pub context: &'a Map<String, Value>,
    pub network: &'a AgentNetwork,
    pub tools: ToolContext,
}

/// An agent runtime: runs one agent against one input.
///
/// Handoffs are reported by invoking the agent's [`crate::network::HandoffEdge`]s;
/// the run itself never switches the active agent.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, agent: &RuntimeAgent, input: &str, ctx: &TurnContext<'_>) -> Result<RunResult>;
}
