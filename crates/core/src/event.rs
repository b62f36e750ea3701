//! Session event log records

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of an event in a session log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Log,
    ToolCall,
    ToolResult,
    Handoff,
    HandoffSuggestion,
    HandoffOverride,
}

/// Who produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRole {
    User,
    Assistant,
    System,
    Tool,
}

/// An immutable, sequenced entry in a session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub role: EventRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp_ms: i64,
}

impl Event {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Target agent of a handoff-type event, from `data.to_agent` or `agent_id`.
    pub fn handoff_target(&self) -> Option<&str> {
        self.data
            .get("to_agent")
            .and_then(Value::as_str)
            .or(self.agent_id.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// An event that has not been sequenced yet.
///
/// The store assigns `seq` and `timestamp_ms` at append time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: EventType,
    pub role: EventRole,
    pub agent_id: Option<String>,
    pub text: Option<String>,
    pub is_final: bool,
    pub message_id: Option<String>,
    pub reason: Option<String>,
    pub data: Map<String, Value>,
    pub tool: Option<String>,
    pub tool_name: Option<String>,
}

impl EventDraft {
    pub fn new(event_type: EventType, role: EventRole) -> Self {
        Self {
            event_type,
            role,
            agent_id: None,
            text: None,
            is_final: false,
            message_id: None,
            reason: None,
            data: Map::new(),
            tool: None,
            tool_name: None,
        }
    }

    pub fn user_message(text: impl Into<String>, message_id: Option<String>) -> Self {
        Self::new(EventType::Message, EventRole::User)
            .text(text)
            .message_id(message_id)
            .finalized()
    }

    pub fn assistant_message(
        agent_id: Option<String>,
        text: impl Into<String>,
        message_id: Option<String>,
    ) -> Self {
        let mut draft = Self::new(EventType::Message, EventRole::Assistant)
            .text(text)
            .message_id(message_id)
            .finalized();
        draft.agent_id = agent_id;
        draft
    }

    pub fn log(text: impl Into<String>) -> Self {
        Self::new(EventType::Log, EventRole::System).text(text)
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn message_id(mut self, message_id: Option<String>) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.tool = Some(name.clone());
        self.tool_name = Some(name);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn finalized(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub(crate) fn into_event(self, session_id: &str, seq: u64) -> Event {
        Event {
            session_id: session_id.to_string(),
            seq,
            event_type: self.event_type,
            role: self.role,
            agent_id: self.agent_id,
            text: self.text,
            is_final: self.is_final,
            message_id: self.message_id,
            reason: self.reason,
            data: self.data,
            tool: self.tool,
            tool_name: self.tool_name,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_wire_names() {
        let event = EventDraft::assistant_message(Some("sales".into()), "hi", None).into_event("s1", 4);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "message");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["final"], true);
        assert_eq!(value["seq"], 4);
        assert!(value.get("message_id").is_none());
    }

    #[test]
    fn test_handoff_target_prefers_data() {
        let event = EventDraft::new(EventType::HandoffSuggestion, EventRole::System)
            .agent("support")
            .with_data("to_agent", json!("sales"))
            .into_event("s1", 1);
        assert_eq!(event.handoff_target(), Some("sales"));

        let event = EventDraft::new(EventType::HandoffSuggestion, EventRole::System)
            .agent("support")
            .into_event("s1", 2);
        assert_eq!(event.handoff_target(), Some("support"));
    }
}
