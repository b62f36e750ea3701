//! Session data model

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MAX_HOPS: u32 = 3;

/// Per-session metadata owned by the event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub usage: UsageTotals,
    pub created_at_ms: i64,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        active_agent_id: Option<String>,
        scenario_id: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            active_agent_id,
            scenario_id,
            context: Map::new(),
            usage: UsageTotals::default(),
            created_at_ms: Utc::now().timestamp_millis(),
        }
    }

    /// A bare record for mutations that arrive before any create call.
    pub fn minimal(session_id: impl Into<String>) -> Self {
        Self::new(session_id, None, None)
    }
}

/// Running token/request counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// A partial usage report from one turn.
///
/// Missing `requests` counts as one request; missing `total_tokens` is
/// derived from input + output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl UsageDelta {
    pub fn single_request() -> Self {
        Self {
            requests: Some(1),
            ..Self::default()
        }
    }

    pub fn normalized(&self) -> UsageTotals {
        let input_tokens = self.input_tokens.unwrap_or(0);
        let output_tokens = self.output_tokens.unwrap_or(0);
        UsageTotals {
            requests: self.requests.unwrap_or(1),
            input_tokens,
            output_tokens,
            total_tokens: self
                .total_tokens
                .unwrap_or(input_tokens.saturating_add(output_tokens)),
        }
    }
}

impl UsageTotals {
    pub fn accumulate(&mut self, delta: &UsageDelta) {
        let delta = delta.normalized();
        self.requests = self.requests.saturating_add(delta.requests);
        self.input_tokens = self.input_tokens.saturating_add(delta.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(delta.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(delta.total_tokens);
    }
}

/// Auto-handoff policy read from `context.routing`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub auto_chain: bool,
    pub max_hops: u32,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            auto_chain: true,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

impl RoutingPolicy {
    pub fn from_context(context: &Map<String, Value>) -> Self {
        let mut policy = Self::default();
        let Some(routing) = context.get("routing").and_then(Value::as_object) else {
            return policy;
        };
        if let Some(auto_chain) = routing.get("auto_chain").and_then(Value::as_bool) {
            policy.auto_chain = auto_chain;
        }
        if let Some(max_hops) = routing.get("max_hops").and_then(Value::as_i64) {
            policy.max_hops = max_hops.clamp(1, u32::MAX as i64) as u32;
        }
        policy
    }
}

/// Roles listed under `context.roles`; non-string entries are ignored.
pub fn context_roles(context: &Map<String, Value>) -> Vec<String> {
    context
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
