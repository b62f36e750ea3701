//! Turn executor
//!
//! Runs one agent for one input and turns the runtime result into session
//! events (`tool_call` / `tool_result`) and a usage report.

use std::sync::Arc;

use convo_core::event::{EventDraft, EventRole, EventType};
use convo_core::mock::MockData;
use convo_core::session::{EventStore, UsageDelta, UsageTotals};
use convo_core::tool::{ToolContext, ToolEnvelope};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::network::{AgentNetwork, RuntimeAgent};
use crate::runtime::{AgentRuntime, RunItem, RunResult, TurnContext};

pub const MAX_TOOL_TEXT_CHARS: usize = 4000;
const SUMMARIZER_TOOL_PREFIX: &str = "summarizer_";
const SUMMARIZER_PROMPTS: [&str; 2] = ["Expand on the key points", "Give me next steps"];

/// Usage for one turn plus the session's running totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub aggregated: UsageTotals,
}

/// What one agent turn produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub agent: String,
    pub final_output: String,
    pub new_items_len: usize,
    pub tool_calls: Vec<String>,
    pub used_tools: Vec<String>,
    pub usage: Option<UsageReport>,
}

impl TurnOutcome {
    pub fn has_text(&self) -> bool {
        !self.final_output.trim().is_empty()
    }
}

pub struct TurnExecutor {
    runtime: Arc<dyn AgentRuntime>,
    store: Arc<EventStore>,
    data: Arc<MockData>,
}

impl TurnExecutor {
    pub fn new(runtime: Arc<dyn AgentRuntime>, store: Arc<EventStore>, data: Arc<MockData>) -> Self {
        Self {
            runtime,
            store,
            data,
        }
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    pub async fn execute(
        &self,
        network: &AgentNetwork,
        agent: &RuntimeAgent,
        input: &str,
        session_id: &str,
        context: &Map<String, Value>,
    ) -> Result<TurnOutcome> {
        let ctx = TurnContext {
            session_id,
            context,
            network,
            tools: ToolContext::new(session_id, context.clone(), Arc::clone(&self.data)),
        };

        let result = self.runtime.run(agent, input, &ctx).await?;
        debug!(
            "Agent {} finished with {} items ({} chars of text)",
            agent.name,
            result.items.len(),
            result.final_output.len()
        );

        self.record_items(session_id, &agent.name, &result).await;

        let delta = result.usage.unwrap_or_else(UsageDelta::single_request);
        let turn = delta.normalized();
        let aggregated = self.store.add_usage(session_id, &delta).await;

        Ok(TurnOutcome {
            agent: agent.name.clone(),
            final_output: result.final_output.trim().to_string(),
            new_items_len: result.items.len(),
            tool_calls: tool_names(&result, true),
            used_tools: tool_names(&result, false),
            usage: Some(UsageReport {
                requests: turn.requests,
                input_tokens: turn.input_tokens,
                output_tokens: turn.output_tokens,
                total_tokens: turn.total_tokens,
                aggregated,
            }),
        })
    }

    async fn record_items(&self, session_id: &str, agent: &str, result: &RunResult) {
        let mut last_args: Map<String, Value> = Map::new();
        for item in &result.items {
            match item {
                RunItem::ToolCall { tool, args } => {
                    last_args.insert(tool.clone(), args.clone());
                    self.store
                        .append(session_id, tool_call_event(agent, tool, args))
                        .await;
                }
                RunItem::ToolOutput { tool, args, output } => {
                    let args = if args.is_null() {
                        last_args.get(tool).cloned().unwrap_or(Value::Null)
                    } else {
                        args.clone()
                    };
                    self.store
                        .append(session_id, tool_result_event(agent, tool, &args, output))
                        .await;
                }
                RunItem::Message { .. } | RunItem::Handoff { .. } => {}
            }
        }
    }
}

fn tool_names(result: &RunResult, calls: bool) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for item in &result.items {
        let name = match item {
            RunItem::ToolCall { tool, .. } if calls => tool,
            RunItem::ToolOutput { tool, .. } if !calls => tool,
            _ => continue,
        };
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

pub fn tool_call_event(agent: &str, tool: &str, args: &Value) -> EventDraft {
    EventDraft::new(EventType::ToolCall, EventRole::Tool)
        .agent(agent)
        .tool(tool)
        .with_data("tool", json!(tool))
        .with_data("tool_name", json!(tool))
        .with_data("args", args.clone())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a summarizer payload (`summary`/`synopsis`/`brief` plus
/// `bullets`/`key_points`) into display text.
fn summarizer_text(output: &Value) -> Option<String> {
    let parsed;
    let obj = match output {
        Value::Object(obj) => obj,
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).ok()?;
            parsed.as_object()?
        }
        _ => return None,
    };
    let head = ["summary", "synopsis", "brief"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .unwrap_or("");
    let bullets: Vec<String> = ["bullets", "key_points"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
        .map(|items| items.iter().map(|b| format!("• {}", stringify(b))).collect())
        .unwrap_or_default();

    let mut lines = Vec::new();
    if !head.is_empty() {
        lines.push(head.to_string());
    }
    lines.extend(bullets);
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn envelope_text(data: &Value) -> Option<String> {
    ["summary", "message"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

pub fn tool_result_event(agent: &str, tool: &str, args: &Value, output: &Value) -> EventDraft {
    let args_map = args.as_object().cloned().unwrap_or_default();

    let (name, envelope, text) = match ToolEnvelope::from_value(output) {
        Some(envelope) => {
            let text = envelope_text(&envelope.data).unwrap_or_else(|| stringify(output));
            (envelope.name.clone(), envelope, text)
        }
        None => {
            let data = match output {
                Value::Object(_) => output.clone(),
                other => json!({ "output": other }),
            };
            let mut envelope = ToolEnvelope::ok(tool, args_map, data);
            let text = if tool.starts_with(SUMMARIZER_TOOL_PREFIX) {
                envelope = envelope.with_prompts(SUMMARIZER_PROMPTS);
                summarizer_text(output).unwrap_or_else(|| stringify(output))
            } else {
                stringify(output)
            };
            (tool.to_string(), envelope, text)
        }
    };

    let mut draft = EventDraft::new(EventType::ToolResult, EventRole::Tool)
        .agent(agent)
        .tool(&name)
        .text(truncate_chars(&text, MAX_TOOL_TEXT_CHARS))
        .with_data("tool", json!(name))
        .with_data("tool_name", json!(name))
        .with_data("output", output.clone());
    if let Some(prompts) = &envelope.recommended_prompts {
        draft = draft.with_data("recommended_prompts", json!(prompts));
    }
    draft.with_data("envelope", envelope.to_value())
}
