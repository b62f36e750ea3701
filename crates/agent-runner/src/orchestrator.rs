//! Turn orchestration loop
//!
//! Drives one user message through at most `max_hops` agent hops, applying
//! handoff suggestions recorded by the runtime, and guarantees a non-empty
//! assistant reply through a summarizer and default-reply fallback chain.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use convo_core::event::{Event, EventDraft, EventRole, EventType};
use convo_core::mock::MockData;
use convo_core::scenario::ScenarioRegistry;
use convo_core::session::{EventStore, RoutingPolicy, Session};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{Result, RuntimeError};
use crate::executor::{TurnExecutor, TurnOutcome, UsageReport};
use crate::network::{AgentNetwork, AgentSpec, HandoffRecorder, NetworkBuilder, DEFAULT_AGENT_NAME};
use crate::runtime::AgentRuntime;

pub const DEFAULT_REPLY: &str =
    "I couldn't generate a full response this turn, but I did receive your message.";
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(15);
const SUMMARIZER_AGENT: &str = "summarizer";
const SUMMARIZER_PROMPT: &str = "Provide a brief helpful reply to the user's message: ";
const AUTO_APPLY_REASON: &str = "llm_auto_apply";
const MANUAL_SWITCH_REASON: &str = "manual_switch";
const SUPERVISOR_AGENT: &str = "supervisor";
const SUPERVISOR_CHOICE_REASON: &str = "supervisor_choice";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub turn_timeout: Duration,
    pub default_reply: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            default_reply: DEFAULT_REPLY.to_string(),
        }
    }
}

/// One user message to process
#[derive(Debug, Clone, Default)]
pub struct MessageRequest {
    pub session_id: String,
    pub user_input: String,
    pub agent: AgentSpec,
    pub client_message_id: Option<String>,
    pub scenario_id: Option<String>,
}

/// Result of a message turn, including the user and assistant events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageResponse {
    pub final_output: String,
    pub new_items_len: usize,
    pub tool_calls: Vec<String>,
    pub used_tools: Vec<String>,
    pub usage: Option<UsageReport>,
    pub used_fallback: bool,
    pub events: Vec<Event>,
}

impl MessageResponse {
    fn replay(prior: Event) -> Self {
        Self {
            final_output: prior.text_or_empty().to_string(),
            events: vec![prior],
            ..Self::default()
        }
    }
}

/// Root agent picked by a scenario's supervisor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootDecision {
    pub chosen_root: Option<String>,
    pub reason: String,
    pub changed: bool,
}

impl RootDecision {
    fn unchanged(chosen_root: Option<String>, reason: &str) -> Self {
        Self {
            chosen_root,
            reason: reason.to_string(),
            changed: false,
        }
    }
}

/// Hands out one async mutex per session id.
///
/// Entries are weak so idle sessions do not pin a lock.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn acquire(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if locks.len() > 128 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(session_id).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(session_id.to_string(), Arc::downgrade(&lock));
        lock
    }
}

/// Running totals across the hops of one message
#[derive(Debug, Default)]
struct HopTally {
    final_output: String,
    answered_by: Option<String>,
    last_agent: Option<String>,
    new_items_len: usize,
    tool_calls: Vec<String>,
    used_tools: Vec<String>,
    usage: Option<UsageReport>,
}

impl HopTally {
    fn absorb(&mut self, agent: &str, outcome: Option<TurnOutcome>) {
        self.last_agent = Some(agent.to_string());
        let Some(outcome) = outcome else {
            self.final_output.clear();
            return;
        };
        self.new_items_len += outcome.new_items_len;
        for name in outcome.tool_calls {
            if !self.tool_calls.contains(&name) {
                self.tool_calls.push(name);
            }
        }
        for name in outcome.used_tools {
            if !self.used_tools.contains(&name) {
                self.used_tools.push(name);
            }
        }
        if outcome.usage.is_some() {
            self.usage = outcome.usage;
        }
        self.final_output = outcome.final_output;
        if !self.final_output.trim().is_empty() {
            self.answered_by = Some(agent.to_string());
        }
    }

    fn has_text(&self) -> bool {
        !self.final_output.trim().is_empty()
    }
}

pub struct Orchestrator {
    store: Arc<EventStore>,
    builder: NetworkBuilder,
    executor: TurnExecutor,
    config: OrchestratorConfig,
    locks: SessionLocks,
}

impl Orchestrator {
    pub fn new(
        store: Arc<EventStore>,
        builder: NetworkBuilder,
        runtime: Arc<dyn AgentRuntime>,
        data: Arc<MockData>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            executor: TurnExecutor::new(runtime, Arc::clone(&store), data),
            store,
            builder,
            config,
            locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn builder(&self) -> &NetworkBuilder {
        &self.builder
    }

    pub fn runtime_name(&self) -> &str {
        self.executor.runtime_name()
    }

    pub fn build_network(
        &self,
        session_id: &str,
        scenario_id: Option<&str>,
        context: &Map<String, Value>,
        spec: &AgentSpec,
    ) -> AgentNetwork {
        self.builder.build(
            scenario_id,
            context,
            spec,
            HandoffRecorder::new(Arc::clone(&self.store), session_id),
        )
    }

    /// Agent a new session should start on: the requested one when it belongs
    /// to the scenario, otherwise the scenario's default root.
    pub fn initial_agent(&self, scenario_id: Option<&str>, requested: Option<&str>) -> String {
        initial_agent(self.builder.scenarios(), scenario_id, requested)
    }

    /// Create a session if it does not exist yet.
    pub async fn ensure_session(
        &self,
        session_id: &str,
        requested_agent: Option<&str>,
        scenario_id: Option<&str>,
    ) -> Session {
        if let Some(session) = self.store.get_session(session_id).await {
            return session;
        }
        let agent = self.initial_agent(scenario_id, requested_agent);
        self.store
            .create_session(session_id, agent, scenario_id.map(str::to_string))
            .await
    }

    /// Manually switch the active agent and record a `handoff_override`.
    pub async fn set_active_agent(&self, session_id: &str, agent_name: &str) -> Event {
        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().await;

        let previous = self.store.set_active_agent(session_id, agent_name).await;
        info!(
            "Manual agent switch in session {}: {:?} -> {}",
            session_id, previous, agent_name
        );
        self.store
            .append(
                session_id,
                EventDraft::new(EventType::HandoffOverride, EventRole::System)
                    .agent(agent_name)
                    .reason(MANUAL_SWITCH_REASON)
                    .with_data("from_agent", json!(previous))
                    .with_data("to_agent", json!(agent_name)),
            )
            .await
    }

    /// Ask the scenario's supervisor which agent should own the conversation.
    ///
    /// The supervisor chooses by invoking one of its handoff edges. With a
    /// session id, a changed choice becomes the active agent and is recorded
    /// as a `handoff` event.
    pub async fn choose_root(
        &self,
        scenario_id: &str,
        last_user_text: &str,
        session_id: Option<&str>,
    ) -> RootDecision {
        let Some(scenario) = self.builder.scenarios().get(scenario_id) else {
            return RootDecision::unchanged(None, "no_such_scenario");
        };
        let default_root = scenario.default_root.clone();
        let Some(supervisor) = scenario
            .agents
            .iter()
            .find(|agent| agent.is_supervisor() || agent.name == SUPERVISOR_AGENT)
            .map(|agent| agent.name.clone())
        else {
            return RootDecision::unchanged(Some(default_root), "no_supervisor");
        };

        let run_session = session_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("sup-{}", scenario_id));
        let lock = self.locks.acquire(&run_session);
        let _guard = lock.lock().await;

        let existing = self.store.get_session(&run_session).await;
        if session_id.is_some() && existing.is_none() {
            self.store
                .create_session(&run_session, default_root.clone(), Some(scenario_id.to_string()))
                .await;
        }

        let context = self.store.get_context(&run_session).await;
        let network = self.build_network(&run_session, Some(scenario_id), &context, &AgentSpec::default());
        let before = self.store.last_seq(&run_session).await;

        if let Some(agent) = network.get(&supervisor) {
            let result = tokio::time::timeout(
                self.config.turn_timeout,
                self.executor
                    .execute(&network, agent, last_user_text, &run_session, &context),
            )
            .await
            .unwrap_or_else(|_| {
                Err(RuntimeError::Timeout {
                    seconds: self.config.turn_timeout.as_secs(),
                })
            });
            if let Err(err) = result {
                warn!("Supervisor {} failed in session {}: {}", supervisor, run_session, err);
                self.store
                    .append(
                        &run_session,
                        EventDraft::log(format!("supervisor_error: {}", err)).agent(supervisor.as_str()),
                    )
                    .await;
            }
        }

        let choice = self
            .store
            .list_events(&run_session, Some(before))
            .await
            .into_iter()
            .rev()
            .filter(|event| event.event_type == EventType::HandoffSuggestion)
            .find_map(|event| {
                let target = event
                    .handoff_target()
                    .filter(|target| network.get(target).is_some())?
                    .to_string();
                Some((target, event.reason))
            });
        let Some((chosen, reason)) = choice else {
            return RootDecision::unchanged(Some(default_root), "supervisor_no_call");
        };
        let reason = reason.unwrap_or_else(|| SUPERVISOR_CHOICE_REASON.to_string());

        let changed = match (session_id, existing) {
            (Some(session_id), Some(session))
                if session.active_agent_id.as_deref() != Some(chosen.as_str()) =>
            {
                self.store.set_active_agent(session_id, &chosen).await;
                self.store
                    .append(
                        session_id,
                        EventDraft::new(EventType::Handoff, EventRole::System)
                            .agent(chosen.as_str())
                            .reason(reason.as_str())
                            .with_data("from_agent", json!(session.active_agent_id))
                            .with_data("to_agent", json!(chosen))
                            .finalized(),
                    )
                    .await;
                info!(
                    "Supervisor moved session {} from {:?} to {}",
                    session_id, session.active_agent_id, chosen
                );
                true
            }
            (Some(session_id), None) => {
                self.store.set_active_agent(session_id, &chosen).await;
                false
            }
            _ => false,
        };

        RootDecision {
            chosen_root: Some(chosen),
            reason,
            changed,
        }
    }

    /// Process one user message. Empty input is rejected; every other path
    /// ends with exactly one assistant message event appended.
    pub async fn handle_message(self: &Arc<Self>, req: MessageRequest) -> Result<MessageResponse> {
        if req.user_input.trim().is_empty() {
            return Err(RuntimeError::invalid_input("user_input cannot be empty"));
        }

        let lock = self.locks.acquire(&req.session_id);
        let guard = Arc::clone(&lock).lock_owned().await;

        if let Some(client_id) = &req.client_message_id {
            if let Some(prior) = self.store.get_by_client_message_id(&req.session_id, client_id).await {
                info!("Replaying message {} for session {}", client_id, req.session_id);
                return Ok(MessageResponse::replay(prior));
            }
        }

        let session_id = req.session_id.clone();
        let client_id = req.client_message_id.clone();
        let this = Arc::clone(self);
        // The guard moves into the task so the session stays serialized even
        // if the caller stops waiting.
        let turn = tokio::spawn(async move {
            let _guard = guard;
            this.process(req).await
        });

        match turn.await {
            Ok(response) => Ok(response),
            Err(join_err) => {
                let _guard = lock.lock().await;
                error!("Turn for session {} aborted: {}", session_id, join_err);
                self.store
                    .append(&session_id, EventDraft::log(format!("turn_error: {}", join_err)))
                    .await;
                let assistant = self
                    .store
                    .append(&session_id, EventDraft::assistant_message(None, "", client_id))
                    .await;
                Ok(MessageResponse {
                    events: vec![assistant],
                    ..MessageResponse::default()
                })
            }
        }
    }

    async fn process(&self, req: MessageRequest) -> MessageResponse {
        let session_id = req.session_id.as_str();
        let user_input = req.user_input.as_str();
        let stored = self.store.get_session(session_id).await;
        let scenario_id = req
            .scenario_id
            .clone()
            .or_else(|| stored.as_ref().and_then(|s| s.scenario_id.clone()));
        let session = match stored {
            Some(session) => session,
            None => {
                self.ensure_session(session_id, req.agent.name.as_deref(), scenario_id.as_deref())
                    .await
            }
        };

        let start_agent = session
            .active_agent_id
            .clone()
            .or_else(|| req.agent.name.clone())
            .unwrap_or_else(|| self.initial_agent(scenario_id.as_deref(), None));

        let user_event = self
            .store
            .append(
                session_id,
                EventDraft::user_message(user_input, req.client_message_id.clone()),
            )
            .await;
        self.store.append(session_id, EventDraft::log("turn_start")).await;

        let span = info_span!(
            "turn",
            session_id = %session_id,
            scenario_id = ?scenario_id,
            client_message_id = ?req.client_message_id,
            start_agent = %start_agent,
        );

        let context = self.store.get_context(session_id).await;
        let network = self.build_network(session_id, scenario_id.as_deref(), &context, &req.agent);
        let (tally, used_fallback) = async {
            let mut tally = self
                .run_hops(session_id, user_input, &network, &context, &start_agent)
                .await;
            if !tally.has_text() {
                self.store.append(session_id, EventDraft::log("assistant_no_text")).await;
            }
            let used_fallback = self
                .apply_fallbacks(session_id, user_input, &network, &context, &mut tally)
                .await;
            (tally, used_fallback)
        }
        .instrument(span)
        .await;

        let message_id = req
            .client_message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let answered_by = tally.answered_by.clone().or(tally.last_agent.clone());
        let assistant_event = self
            .store
            .append(
                session_id,
                EventDraft::assistant_message(answered_by, tally.final_output.clone(), Some(message_id)),
            )
            .await;
        if let Some(client_id) = &req.client_message_id {
            self.store
                .remember_client_message(session_id, client_id, assistant_event.clone())
                .await;
        }
        self.store.append(session_id, EventDraft::log("turn_end")).await;

        MessageResponse {
            final_output: tally.final_output,
            new_items_len: tally.new_items_len,
            tool_calls: tally.tool_calls,
            used_tools: tally.used_tools,
            usage: tally.usage,
            used_fallback,
            events: vec![user_event, assistant_event],
        }
    }

    async fn run_hops(
        &self,
        session_id: &str,
        input: &str,
        network: &AgentNetwork,
        context: &Map<String, Value>,
        start_agent: &str,
    ) -> HopTally {
        let policy = RoutingPolicy::from_context(context);
        let mut tally = HopTally::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut hop_count: u32 = 0;
        let mut current = match network.resolve(start_agent) {
            Some(agent) => agent.name.clone(),
            None => return tally,
        };

        loop {
            if !visited.insert(current.clone()) {
                info!("Agent {} already ran this turn, stopping", current);
                break;
            }

            let before = self.store.last_seq(session_id).await;
            let outcome = self
                .run_turn_bounded(session_id, input, network, context, &current)
                .await;
            tally.absorb(&current, outcome);

            let suggestion = self
                .store
                .list_events(session_id, Some(before))
                .await
                .into_iter()
                .rev()
                .find(|event| event.event_type == EventType::HandoffSuggestion)
                .and_then(|event| event.handoff_target().map(str::to_string))
                .filter(|target| network.get(target).is_some());

            let Some(target) = suggestion.filter(|target| *target != current) else {
                break;
            };

            self.store.set_active_agent(session_id, &target).await;
            self.store
                .append(
                    session_id,
                    EventDraft::new(EventType::Handoff, EventRole::System)
                        .agent(target.as_str())
                        .reason(AUTO_APPLY_REASON)
                        .with_data("from_agent", json!(current))
                        .with_data("to_agent", json!(target)),
                )
                .await;
            info!("Applied handoff {} -> {} in session {}", current, target, session_id);

            if tally.has_text() || !policy.auto_chain {
                break;
            }
            hop_count += 1;
            if hop_count >= policy.max_hops {
                info!("Hop limit {} reached in session {}", policy.max_hops, session_id);
                break;
            }
            current = target;
        }

        tally
    }

    /// Run one hop under the turn timeout. Failures are logged to the session
    /// and become an empty result.
    async fn run_turn_bounded(
        &self,
        session_id: &str,
        input: &str,
        network: &AgentNetwork,
        context: &Map<String, Value>,
        agent_name: &str,
    ) -> Option<TurnOutcome> {
        let Some(agent) = network.get(agent_name) else {
            let err = RuntimeError::UnknownAgent {
                name: agent_name.to_string(),
            };
            self.store.append(session_id, EventDraft::log(err.log_text())).await;
            return None;
        };

        let result = tokio::time::timeout(
            self.config.turn_timeout,
            self.executor.execute(network, agent, input, session_id, context),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RuntimeError::Timeout {
                seconds: self.config.turn_timeout.as_secs(),
            })
        });

        match result {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!("Turn for agent {} in session {} failed: {}", agent_name, session_id, err);
                self.store
                    .append(session_id, EventDraft::log(err.log_text()).agent(agent_name))
                    .await;
                None
            }
        }
    }

    async fn apply_fallbacks(
        &self,
        session_id: &str,
        input: &str,
        network: &AgentNetwork,
        context: &Map<String, Value>,
        tally: &mut HopTally,
    ) -> bool {
        if tally.has_text() {
            return false;
        }

        if network.scenario_id.is_some() && network.get(SUMMARIZER_AGENT).is_some() {
            let prompt = format!("{}{}", SUMMARIZER_PROMPT, input);
            let outcome = self
                .run_turn_bounded(session_id, &prompt, network, context, SUMMARIZER_AGENT)
                .await;
            if outcome.as_ref().is_some_and(TurnOutcome::has_text) {
                tally.absorb(SUMMARIZER_AGENT, outcome);
                self.store
                    .append(session_id, EventDraft::log("fallback:summarizer"))
                    .await;
                return true;
            }
        }

        tally.final_output = self.config.default_reply.clone();
        self.store
            .append(session_id, EventDraft::log("assistant_default_reply"))
            .await;
        true
    }
}

/// Requested agent if the scenario has it, else the scenario root, else the
/// requested name or the stock assistant.
pub fn initial_agent(
    scenarios: &ScenarioRegistry,
    scenario_id: Option<&str>,
    requested: Option<&str>,
) -> String {
    let requested = requested.map(str::trim).filter(|name| !name.is_empty());
    match scenario_id.and_then(|id| scenarios.get(id)) {
        Some(scenario) => match requested {
            Some(name) if scenario.has_agent(name) => name.to_string(),
            _ => scenario.default_root.clone(),
        },
        None => requested.unwrap_or(DEFAULT_AGENT_NAME).to_string(),
    }
}
