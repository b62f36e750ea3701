use async_trait::async_trait;
use convo_core::tool::ToolDescriptor;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{AgentRuntime, RunItem, RunResult, TurnContext};
use crate::error::{Result, RuntimeError};
use crate::network::{AgentTool, RuntimeAgent};

#[derive(Serialize)]
struct AgentPayload<'a> {
    name: &'a str,
    role: &'a str,
    model: &'a str,
    instructions: &'a str,
    temperature: f32,
    tools: Vec<ToolDescriptor>,
    handoffs: Vec<&'a str>,
    agent_tools: &'a [AgentTool],
}

#[derive(Serialize)]
struct RunRequest<'a> {
    agent: AgentPayload<'a>,
    input: &'a str,
    session_id: &'a str,
    context: &'a Map<String, Value>,
}

/// Runtime adapter that posts turns to an external runtime service.
///
/// The service answers `POST {url}/run` with a JSON [`RunResult`].
pub struct HttpRuntime {
    client: Client,
    url: String,
}

impl HttpRuntime {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            // Internal service traffic bypasses any configured proxy
            client: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Forward handoff items to the matching edges so they land as suggestions.
async fn dispatch_handoffs(agent: &RuntimeAgent, items: &[RunItem]) -> usize {
    let mut recorded = 0;
    for item in items {
        let RunItem::Handoff {
            target,
            reason,
            recommended_prompts,
        } = item
        else {
            continue;
        };
        match agent.handoff_to(target) {
            Some(edge) => {
                edge.invoke(reason.as_deref(), recommended_prompts.clone()).await;
                recorded += 1;
            }
            None => warn!("Agent {} has no handoff edge to {}", agent.name, target),
        }
    }
    recorded
}

#[async_trait]
impl AgentRuntime for HttpRuntime {
    fn name(&self) -> &str {
        "http"
    }

    async fn run(&self, agent: &RuntimeAgent, input: &str, ctx: &TurnContext<'_>) -> Result<RunResult> {
        let req = RunRequest {
            agent: AgentPayload {
                name: &agent.name,
                role: &agent.role,
                model: &agent.model,
                instructions: &agent.instructions,
                temperature: agent.temperature,
                tools: agent.tools.iter().map(|tool| tool.descriptor()).collect(),
                handoffs: agent.handoffs.iter().map(|edge| edge.target.as_str()).collect(),
                agent_tools: &agent.agent_tools,
            },
            input,
            session_id: ctx.session_id,
            context: ctx.context,
        };

        info!("Sending run request for agent {} to {}/run", agent.name, self.url);

        let res = self
            .client
            .post(format!("{}/run", self.url))
            .json(&req)
            .send()
            .await
            .map_err(|e| RuntimeError::network(format!("Failed to reach runtime: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let error_text = res.text().await.unwrap_or_default();
            return Err(RuntimeError::runtime(format!(
                "Runtime returned {}: {}",
                status, error_text
            )));
        }

        let result: RunResult = res
            .json()
            .await
            .map_err(|e| RuntimeError::invalid_response(e.to_string()))?;

        dispatch_handoffs(agent, &result.items).await;
        Ok(result)
    }
}
