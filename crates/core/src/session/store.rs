//! In-memory session and event store

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::model::{Session, UsageDelta, UsageTotals};
use crate::error::Error;
use crate::event::{Event, EventDraft};
use crate::Result;

#[derive(Debug)]
struct SessionRecord {
    session: Session,
    events: Vec<Event>,
    client_messages: HashMap<String, Event>,
}

impl SessionRecord {
    fn new(session: Session) -> Self {
        Self {
            session,
            events: Vec::new(),
            client_messages: HashMap::new(),
        }
    }

    fn next_seq(&self) -> u64 {
        self.events.last().map(|event| event.seq + 1).unwrap_or(1)
    }
}

/// Owns every session record and its event log.
///
/// Sequence allocation and append happen under a single write lock, so the
/// per-session `seq` values stay gapless even when turns race.
#[derive(Debug, Default)]
pub struct EventStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session. A second call for the same id is a no-op and the
    /// existing record is returned unchanged.
    pub async fn create_session(
        &self,
        session_id: &str,
        active_agent_id: impl Into<String>,
        scenario_id: Option<String>,
    ) -> Session {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(session_id) {
            debug!("Session {} already exists, keeping it", session_id);
            return existing.session.clone();
        }
        let session = Session::new(session_id, Some(active_agent_id.into()), scenario_id);
        sessions.insert(session_id.to_string(), SessionRecord::new(session.clone()));
        session
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|record| record.session.clone())
    }

    pub async fn next_seq(&self, session_id: &str) -> u64 {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(SessionRecord::next_seq)
            .unwrap_or(1)
    }

    /// Highest sequence number appended so far (0 for an empty log).
    pub async fn last_seq(&self, session_id: &str) -> u64 {
        self.next_seq(session_id).await - 1
    }

    /// Append a pre-sequenced event; rejects anything but the next seq.
    pub async fn append_event(&self, session_id: &str, event: Event) -> Result<Event> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(Session::minimal(session_id)));

        let expected = record.next_seq();
        if event.seq != expected {
            return Err(Error::SequenceConflict {
                session_id: session_id.to_string(),
                expected,
                got: event.seq,
            });
        }
        let mut event = event;
        event.session_id = session_id.to_string();
        record.events.push(event.clone());
        Ok(event)
    }

    /// Allocate the next seq and append in one step.
    pub async fn append(&self, session_id: &str, draft: EventDraft) -> Event {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(Session::minimal(session_id)));

        let event = draft.into_event(session_id, record.next_seq());
        record.events.push(event.clone());
        event
    }

    /// Events with `seq > since`, ascending.
    pub async fn list_events(&self, session_id: &str, since: Option<u64>) -> Vec<Event> {
        let sessions = self.sessions.read().await;
        let Some(record) = sessions.get(session_id) else {
            return Vec::new();
        };
        let since = since.unwrap_or(0);
        let start = record.events.partition_point(|event| event.seq <= since);
        record.events[start..].to_vec()
    }

    pub async fn get_by_client_message_id(
        &self,
        session_id: &str,
        client_message_id: &str,
    ) -> Option<Event> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .and_then(|record| record.client_messages.get(client_message_id))
            .cloned()
    }

    pub async fn remember_client_message(
        &self,
        session_id: &str,
        client_message_id: &str,
        event: Event,
    ) {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(Session::minimal(session_id)));
        record
            .client_messages
            .insert(client_message_id.to_string(), event);
    }

    /// Returns the previously active agent.
    pub async fn set_active_agent(&self, session_id: &str, agent_id: &str) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(Session::minimal(session_id)));
        record.session.active_agent_id.replace(agent_id.to_string())
    }

    pub async fn get_context(&self, session_id: &str) -> Map<String, Value> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|record| record.session.context.clone())
            .unwrap_or_default()
    }

    /// Shallow-merge `patch` into the session context and return the result.
    pub async fn set_context(
        &self,
        session_id: &str,
        patch: Map<String, Value>,
    ) -> Map<String, Value> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(Session::minimal(session_id)));
        record.session.context.extend(patch);
        record.session.context.clone()
    }

    /// Accumulate usage and return the running totals.
    pub async fn add_usage(&self, session_id: &str, delta: &UsageDelta) -> UsageTotals {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(Session::minimal(session_id)));
        record.session.usage.accumulate(delta);
        record.session.usage
    }

    pub async fn get_usage(&self, session_id: &str) -> UsageTotals {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|record| record.session.usage)
            .unwrap_or_default()
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::event::EventType;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_session_is_noop_when_present() {
        let store = EventStore::new();
        store.create_session("s1", "general", Some("default".into())).await;
        let again = store.create_session("s1", "sales", None).await;

        assert_eq!(again.active_agent_id.as_deref(), Some("general"));
        assert_eq!(again.scenario_id.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn test_sequence_is_gapless_and_starts_at_one() {
        let store = EventStore::new();
        assert_eq!(store.next_seq("s1").await, 1);

        for i in 0..5 {
            store.append("s1", EventDraft::log(format!("log {}", i))).await;
        }

        let seqs: Vec<u64> = store.list_events("s1", None).await.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.next_seq("s1").await, 6);
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_duplicate_seq() {
        let store = Arc::new(EventStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.append("s1", EventDraft::log(format!("{}", i))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = store.list_events("s1", None).await;
        assert_eq!(events.len(), 32);
        for (idx, event) in events.iter().enumerate() {
            assert_eq!(event.seq, idx as u64 + 1);
        }
    }

    #[tokio::test]
    async fn test_append_event_rejects_stale_seq() {
        let store = EventStore::new();
        let first = store.append("s1", EventDraft::log("a")).await;

        let err = store.append_event("s1", first.clone()).await.unwrap_err();
        assert!(matches!(err, Error::SequenceConflict { expected: 2, got: 1, .. }));

        let mut next = first;
        next.seq = store.next_seq("s1").await;
        let stored = store.append_event("s1", next).await.unwrap();
        assert_eq!(stored.seq, 2);
    }

    #[tokio::test]
    async fn test_list_events_since_returns_suffix() {
        let store = EventStore::new();
        for i in 0..4 {
            store.append("s1", EventDraft::log(format!("{}", i))).await;
        }

        let suffix = store.list_events("s1", Some(2)).await;
        assert_eq!(suffix.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
        assert!(store.list_events("s1", Some(4)).await.is_empty());
        assert!(store.list_events("missing", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_client_message_lookup() {
        let store = EventStore::new();
        let event = store
            .append("s1", EventDraft::assistant_message(Some("general".into()), "hello", Some("c1".into())))
            .await;
        store.remember_client_message("s1", "c1", event.clone()).await;

        assert_eq!(store.get_by_client_message_id("s1", "c1").await, Some(event));
        assert!(store.get_by_client_message_id("s1", "c2").await.is_none());
        assert!(store.get_by_client_message_id("other", "c1").await.is_none());
    }

    #[tokio::test]
    async fn test_context_merges_and_unknown_is_empty() {
        let store = EventStore::new();
        assert!(store.get_context("s1").await.is_empty());

        store
            .set_context("s1", json!({ "roles": ["sales"] }).as_object().cloned().unwrap())
            .await;
        let merged = store
            .set_context("s1", json!({ "routing": { "max_hops": 2 } }).as_object().cloned().unwrap())
            .await;

        assert_eq!(merged["roles"], json!(["sales"]));
        assert_eq!(merged["routing"]["max_hops"], 2);
    }

    #[tokio::test]
    async fn test_usage_accumulates() {
        let store = EventStore::new();
        assert_eq!(store.get_usage("s1").await, UsageTotals::default());

        store
            .add_usage("s1", &UsageDelta { input_tokens: Some(3), output_tokens: Some(4), ..Default::default() })
            .await;
        let totals = store.add_usage("s1", &UsageDelta::single_request()).await;

        assert_eq!(totals.requests, 2);
        assert_eq!(totals.input_tokens, 3);
        assert_eq!(totals.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_set_active_agent_and_delete() {
        let store = EventStore::new();
        assert_eq!(store.set_active_agent("s1", "sales").await, None);
        assert_eq!(store.set_active_agent("s1", "support").await.as_deref(), Some("sales"));

        store.append("s1", EventDraft::new(EventType::Log, crate::event::EventRole::System)).await;
        assert!(store.delete_session("s1").await);
        assert!(store.get_session("s1").await.is_none());
        assert!(store.list_events("s1", None).await.is_empty());
        assert!(!store.delete_session("s1").await);
    }
}
