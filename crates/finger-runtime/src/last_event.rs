//! Per-agent last-event store
//!
//! The read model behind catalog status derivation. Owned by the
//! scheduler (its lifecycle is the scheduler's lifecycle); other
//! components reach it through the scheduler's accessor.

use dashmap::DashMap;
use finger_core::{AgentLastEvent, LastEventKind, SharedClock};

/// Most-recent runtime activity per agent
pub struct LastEventStore {
    clock: SharedClock,
    entries: DashMap<String, AgentLastEvent>,
}

impl LastEventStore {
    /// Empty store stamping entries with the given clock
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
        }
    }

    /// Record an event for an agent, replacing the previous entry
    pub fn record(
        &self,
        agent_id: &str,
        kind: LastEventKind,
        status: impl Into<String>,
        summary: impl Into<String>,
        session_id: Option<String>,
        workflow_id: Option<String>,
        dispatch_id: Option<String>,
    ) {
        self.entries.insert(
            agent_id.to_string(),
            AgentLastEvent {
                kind,
                status: status.into(),
                summary: summary.into(),
                timestamp: self.clock.now(),
                session_id,
                workflow_id,
                dispatch_id,
            },
        );
    }

    /// Last event for an agent
    pub fn get(&self, agent_id: &str) -> Option<AgentLastEvent> {
        self.entries.get(agent_id).map(|e| e.value().clone())
    }

    /// Snapshot of all entries, sorted by agent id
    pub fn all(&self) -> Vec<(String, AgentLastEvent)> {
        let mut all: Vec<(String, AgentLastEvent)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finger_core::system_clock;

    #[test]
    fn test_record_replaces_previous_entry() {
        let store = LastEventStore::new(system_clock());
        store.record(
            "executor",
            LastEventKind::Dispatch,
            "queued",
            "dispatch queued",
            None,
            None,
            Some("dispatch-1-aaaaaa".to_string()),
        );
        store.record(
            "executor",
            LastEventKind::Dispatch,
            "completed",
            "dispatch completed",
            None,
            None,
            Some("dispatch-1-aaaaaa".to_string()),
        );

        let last = store.get("executor").unwrap();
        assert_eq!(last.status, "completed");
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_missing_agent_has_no_entry() {
        let store = LastEventStore::new(system_clock());
        assert!(store.get("ghost").is_none());
    }
}
