//! Tool registry, envelope contract and built-in tools

mod builtin;
mod envelope;
mod registry;

pub use envelope::ToolEnvelope;
pub use registry::{
    roles_permit, ToolContext, ToolDescriptor, ToolHandler, ToolRegistry, ToolSpec, ToolSummary,
};
