use async_trait::async_trait;
use convo_core::session::UsageDelta;
use convo_core::tool::ToolEnvelope;
use serde_json::{json, Value};
use tracing::debug;

use super::{AgentRuntime, RunItem, RunResult, TurnContext};
use crate::error::Result;
use crate::network::RuntimeAgent;

const SALES_KEYWORDS: &[&str] = &["buy", "price", "recommend", "product", "catalog", "purchase"];
const SUPPORT_KEYWORDS: &[&str] = &["error", "issue", "problem", "troubleshoot", "not working", "help"];
const SUMMARIZER: &str = "summarizer";
const SUMMARY_PREVIEW_CHARS: usize = 200;

/// Specialist a message should go to, by keyword. Sales wins ties.
pub fn route_for(input: &str) -> Option<&'static str> {
    let text = input.to_lowercase();
    if SALES_KEYWORDS.iter().any(|k| text.contains(k)) {
        Some("sales")
    } else if SUPPORT_KEYWORDS.iter().any(|k| text.contains(k)) {
        Some("support")
    } else {
        None
    }
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn estimate_usage(input: &str, output: &str) -> UsageDelta {
    UsageDelta {
        requests: Some(1),
        input_tokens: Some(word_count(input)),
        output_tokens: Some(word_count(output)),
        total_tokens: None,
    }
}

fn describe(envelope: &ToolEnvelope) -> Option<String> {
    if let Some(results) = envelope.data.get("results").and_then(Value::as_array) {
        let names: Vec<String> = results
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                Some(match item.get("price").and_then(Value::as_f64) {
                    Some(price) => format!("{} (${:.2})", name, price),
                    None => name.to_string(),
                })
            })
            .collect();
        if !names.is_empty() {
            return Some(format!("Here are some options: {}.", names.join(", ")));
        }
    }
    ["summary", "message"]
        .iter()
        .find_map(|key| envelope.data.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Deterministic offline runtime.
///
/// Routes by keyword through the agent's handoff edges, calls a matching
/// tool, and answers with a short canned reply. Used when no external
/// runtime is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRuntime;

impl KeywordRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentRuntime for KeywordRuntime {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn run(&self, agent: &RuntimeAgent, input: &str, ctx: &TurnContext<'_>) -> Result<RunResult> {
        if agent.name == SUMMARIZER {
            let preview: String = input.chars().take(SUMMARY_PREVIEW_CHARS).collect();
            let reply = format!("Summary: {}", preview.trim());
            return Ok(RunResult {
                usage: Some(estimate_usage(input, &reply)),
                items: vec![RunItem::Message { text: reply.clone() }],
                final_output: reply,
            });
        }

        if let Some(target) = route_for(input).filter(|target| *target != agent.name) {
            if let Some(edge) = agent.handoff_to(target) {
                let reason = format!("keyword match for {}", target);
                edge.invoke(Some(&reason), None).await;
                debug!("Keyword runtime routed {} -> {}", agent.name, target);
                return Ok(RunResult {
                    final_output: String::new(),
                    items: vec![RunItem::Handoff {
                        target: target.to_string(),
                        reason: Some(reason),
                        recommended_prompts: None,
                    }],
                    usage: Some(estimate_usage(input, "")),
                });
            }
        }

        let mut items = Vec::new();
        let mut detail = None;
        let call = [
            ("product_search", json!({ "query": input })),
            ("echo_context", json!({ "text": input })),
        ]
        .into_iter()
        .find_map(|(name, args)| agent.tool(name).map(|tool| (tool, args)));

        if let Some((tool, args)) = call {
            items.push(RunItem::ToolCall {
                tool: tool.name.clone(),
                args: args.clone(),
            });
            let output = match tool.invoke(&ctx.tools, &args) {
                Ok(envelope) => {
                    detail = describe(&envelope);
                    envelope.to_value()
                }
                Err(err) => json!({ "ok": false, "name": tool.name, "args": args, "error": err.to_string() }),
            };
            items.push(RunItem::ToolOutput {
                tool: tool.name.clone(),
                args,
                output,
            });
        }

        let reply = match detail {
            Some(detail) if agent.tool("product_search").is_some() => {
                format!("[{}] {}", agent.name, detail)
            }
            _ => format!("[{}] I received your message: {}", agent.name, input.trim()),
        };
        items.push(RunItem::Message { text: reply.clone() });

        Ok(RunResult {
            usage: Some(estimate_usage(input, &reply)),
            items,
            final_output: reply,
        })
    }
}
