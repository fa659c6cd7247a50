//! Event bus - typed pub/sub with subscriber fan-out
//!
//! The bus is the single publication point for every scheduler decision
//! and re-emitted runner event. `emit` never blocks and never fails:
//! subscriber trouble is isolated to that subscriber. Each subscriber
//! observes events in emission order through its own channel; a dropped
//! receiver unsubscribes implicitly, so the bus never extends a
//! subscriber's lifetime.

use finger_core::{EventKind, RuntimeEvent, SharedClock, DEFAULT_SESSION_ID};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<RuntimeEvent>,
}

/// Receiving end of a bus subscription
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<RuntimeEvent>,
}

impl EventStream {
    /// Next event in emission order; `None` once the bus is dropped
    pub async fn next(&mut self) -> Option<RuntimeEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll used by tests
    pub fn try_next(&mut self) -> Option<RuntimeEvent> {
        self.rx.try_recv().ok()
    }
}

/// Typed pub/sub bus for runtime events
pub struct EventBus {
    clock: SharedClock,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    default_session: RwLock<Option<String>>,
}

impl EventBus {
    /// Create a bus stamping events with the given clock
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            default_session: RwLock::new(None),
        }
    }

    /// Session id applied to events emitted without one
    pub fn set_default_session(&self, session_id: Option<String>) {
        *self.default_session.write() = session_id;
    }

    /// Subscribe to all events from this point on
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber { id, tx });
        EventStream { rx }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Build and publish an event. Never blocks, never fails.
    pub fn emit(
        &self,
        kind: EventKind,
        session_id: Option<String>,
        agent_id: Option<String>,
        payload: Value,
    ) {
        let session_id = session_id
            .or_else(|| self.default_session.read().clone())
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
        let event = RuntimeEvent::new(
            kind,
            Some(session_id),
            self.clock.now(),
            agent_id,
            payload,
        );
        self.emit_event(event);
    }

    /// Publish a pre-built event (pass-through for runner events)
    pub fn emit_event(&self, event: RuntimeEvent) {
        let mut dead: Vec<u64> = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for subscriber in subscribers.iter() {
                if subscriber.tx.send(event.clone()).is_err() {
                    dead.push(subscriber.id);
                }
            }
        }
        if !dead.is_empty() {
            debug!("pruning {} dropped event subscribers", dead.len());
            self.subscribers
                .write()
                .retain(|s| !dead.contains(&s.id));
        }
    }
}
