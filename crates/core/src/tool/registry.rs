use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::envelope::ToolEnvelope;
use crate::error::Error;
use crate::mock::MockData;
use crate::Result;

/// What a tool sees of the calling session
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub context: Map<String, Value>,
    pub data: Arc<MockData>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, context: Map<String, Value>, data: Arc<MockData>) -> Self {
        Self {
            session_id: session_id.into(),
            context,
            data,
        }
    }
}

pub type ToolHandler = fn(&ToolContext, &Map<String, Value>) -> Result<ToolEnvelope>;

/// A registered tool: explicit schema, role allowlist and a pure handler
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub roles_allowed: Vec<String>,
    handler: ToolHandler,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("roles_allowed", &self.roles_allowed)
            .finish()
    }
}

/// Public shape of a tool for catalogs and runtimes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub roles_allowed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: Option<String>,
    pub params: Option<Value>,
}

/// Empty allowlist means visible to everyone; otherwise the role sets must
/// intersect.
pub fn roles_permit(allowed: &[String], roles: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|role| roles.contains(role))
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, parameters: Value, handler: ToolHandler) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            roles_allowed: Vec::new(),
            handler,
        }
    }

    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles_allowed = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn visible_to(&self, roles: &[String]) -> bool {
        roles_permit(&self.roles_allowed, roles)
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            roles_allowed: self.roles_allowed.clone(),
        }
    }

    /// Validate `args` against the declared schema and run the handler.
    pub fn invoke(&self, ctx: &ToolContext, args: &Value) -> Result<ToolEnvelope> {
        let args = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{}: arguments must be an object",
                    self.name
                )))
            }
        };
        self.check_args(&args)?;
        (self.handler)(ctx, &args)
    }

    fn check_args(&self, args: &Map<String, Value>) -> Result<()> {
        let properties = self
            .parameters
            .get("properties")
            .and_then(Value::as_object);

        if let Some(required) = self.parameters.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !args.contains_key(key) {
                    return Err(Error::InvalidInput(format!(
                        "{}: missing required argument '{}'",
                        self.name, key
                    )));
                }
            }
        }

        let closed = self.parameters.get("additionalProperties") == Some(&Value::Bool(false));
        if closed {
            if let Some(unknown) = args
                .keys()
                .find(|key| properties.map_or(true, |props| !props.contains_key(*key)))
            {
                return Err(Error::InvalidInput(format!(
                    "{}: unexpected argument '{}'",
                    self.name, unknown
                )));
            }
        }
        Ok(())
    }
}

/// Immutable name -> tool table, built once at startup
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn list(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Resolve an agent's tool names, dropping unknown names and tools the
    /// roles may not see.
    pub fn resolve(&self, names: &[String], roles: &[String]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|name| match self.get(name) {
                Some(tool) => Some(tool),
                None => {
                    debug!("Skipping unregistered tool '{}'", name);
                    None
                }
            })
            .filter(|tool| tool.visible_to(roles))
            .cloned()
            .collect()
    }

    /// Every tool when `roles` is `None`, otherwise only role-visible ones.
    pub fn catalog(&self, roles: Option<&[String]>) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .filter(|tool| roles.map_or(true, |roles| tool.visible_to(roles)))
            .map(ToolSpec::descriptor)
            .collect()
    }

    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.tools
            .iter()
            .map(|tool| ToolSummary {
                name: tool.name.clone(),
                description: Some(tool.description.clone()).filter(|d| !d.is_empty()),
                params: Some(tool.parameters.clone()).filter(|p| !p.is_null()),
            })
            .collect()
    }
}
