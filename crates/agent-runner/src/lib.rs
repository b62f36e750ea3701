//! Agent Runner - turn execution over an external agent runtime
//!
//! This crate provides:
//! - The runtime boundary ([`AgentRuntime`]) with HTTP and offline keyword adapters
//! - Agent network construction with role-gated tools and handoff edges
//! - Per-agent turn execution with tool event shaping
//! - The multi-hop handoff orchestration loop

pub mod error;
pub mod executor;
pub mod network;
pub mod orchestrator;
pub mod runtime;

pub use error::{Result, RuntimeError};
pub use executor::{TurnExecutor, TurnOutcome, UsageReport};
pub use network::{
    AgentNetwork, AgentSpec, AgentTool, AgentToolAllowlist, HandoffEdge, HandoffRecorder,
    NetworkBuilder, RuntimeAgent,
};
pub use orchestrator::{
    initial_agent, MessageRequest, MessageResponse, Orchestrator, OrchestratorConfig, RootDecision,
};
pub use runtime::{AgentRuntime, HttpRuntime, KeywordRuntime, RunItem, RunResult, TurnContext};
