//! Application state

use std::sync::Arc;

use agent_runner::{
    AgentRuntime, HttpRuntime, KeywordRuntime, NetworkBuilder, Orchestrator, OrchestratorConfig,
};
use convo_core::mock::MockData;
use convo_core::scenario::ScenarioRegistry;
use convo_core::session::EventStore;
use convo_core::tool::{ToolContext, ToolRegistry};
use serde_json::{Map, Value};

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    orchestrator: Arc<Orchestrator>,
    data: Arc<MockData>,
}

impl AppState {
    /// Build state with the runtime selected by the config: HTTP when a
    /// runtime URL is set, the offline keyword runtime otherwise.
    pub fn new(config: AppConfig, data: MockData) -> Self {
        let runtime: Arc<dyn AgentRuntime> = match &config.runtime_url {
            Some(url) => Arc::new(HttpRuntime::new(url.clone())),
            None => Arc::new(KeywordRuntime::new()),
        };
        Self::with_runtime(config, data, runtime)
    }

    pub fn with_runtime(config: AppConfig, data: MockData, runtime: Arc<dyn AgentRuntime>) -> Self {
        let data = Arc::new(data);
        let builder = NetworkBuilder::new(
            Arc::new(ScenarioRegistry::builtin()),
            Arc::new(ToolRegistry::builtin()),
        )
        .with_allowlist(config.agent_tool_allowlist.clone())
        .with_default_model(config.default_model.clone());

        let orchestrator = Orchestrator::new(
            Arc::new(EventStore::new()),
            builder,
            runtime,
            Arc::clone(&data),
            OrchestratorConfig {
                turn_timeout: config.turn_timeout,
                default_reply: config.default_reply.clone(),
            },
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator: Arc::new(orchestrator),
                data,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.inner.orchestrator
    }

    pub fn store(&self) -> &EventStore {
        self.inner.orchestrator.store()
    }

    pub fn scenarios(&self) -> &ScenarioRegistry {
        self.inner.orchestrator.builder().scenarios()
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.inner.orchestrator.builder().tools()
    }

    pub fn tool_context(&self, session_id: &str, context: Map<String, Value>) -> ToolContext {
        ToolContext::new(session_id, context, Arc::clone(&self.inner.data))
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    AppState::new(AppConfig::default(), MockData::seeded())
}
