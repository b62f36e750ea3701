use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard wrapped result of every tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub ok: bool,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_prompts: Option<Vec<String>>,
}

impl ToolEnvelope {
    pub fn ok(name: impl Into<String>, args: Map<String, Value>, data: Value) -> Self {
        Self {
            ok: true,
            name: name.into(),
            args,
            data,
            meta: None,
            recommended_prompts: None,
        }
    }

    pub fn with_prompts<I, S>(mut self, prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommended_prompts = Some(prompts.into_iter().map(Into::into).collect());
        self
    }

    /// True for objects shaped like an envelope: `ok` and `name`, plus
    /// `data` or `args`.
    pub fn looks_like(value: &Value) -> bool {
        let Some(obj) = value.as_object() else {
            return false;
        };
        obj.contains_key("ok")
            && obj.contains_key("name")
            && (obj.contains_key("data") || obj.contains_key("args"))
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        if !Self::looks_like(value) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_looks_like_requires_payload() {
        assert!(ToolEnvelope::looks_like(&json!({ "ok": true, "name": "x", "data": 1 })));
        assert!(ToolEnvelope::looks_like(&json!({ "ok": true, "name": "x", "args": {} })));
        assert!(!ToolEnvelope::looks_like(&json!({ "ok": true, "name": "x" })));
        assert!(!ToolEnvelope::looks_like(&json!("ok")));
    }

    #[test]
    fn test_envelope_omits_empty_optionals() {
        let env = ToolEnvelope::ok("weather", Map::new(), json!({ "city": "Oslo" }));
        let value = env.to_value();
        assert!(value.get("meta").is_none());
        assert!(value.get("recommended_prompts").is_none());
        assert_eq!(ToolEnvelope::from_value(&value), Some(env));
    }
}
