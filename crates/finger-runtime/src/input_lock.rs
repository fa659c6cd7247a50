//! Input lock manager - per-session exclusive input coordination
//!
//! At most one client holds a session's input lock at a time. The lock
//! expires when heartbeats stop; expiry runs on every access plus a
//! fixed-cadence scan. Every state change emits `input_lock_changed`;
//! typing changes from the current holder emit `typing_indicator`.
//!
//! Acquire is fail-open on the caller side: a client that cannot reach
//! the manager within five seconds proceeds as if granted, so user
//! input never silently drops.

use crate::bus::EventBus;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use finger_core::{EventKind, SharedClock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default lock TTL without heartbeats
pub const DEFAULT_LOCK_TTL_MS: i64 = 90_000;

/// Default cadence of the background expiry scan
pub const DEFAULT_EXPIRE_SCAN_INTERVAL_MS: u64 = 5_000;

/// Lock state for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputLockState {
    /// Session the lock belongs to
    pub session_id: String,

    /// Current holder; `None` when free
    pub locked_by: Option<String>,

    /// When the current holder acquired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,

    /// Whether the holder is typing
    pub typing: bool,

    /// Last heartbeat from the holder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,

    /// Expiry instant; passing it revokes the lock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl InputLockState {
    fn free(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            locked_by: None,
            locked_at: None,
            typing: false,
            last_heartbeat_at: None,
            expires_at: None,
        }
    }
}

/// Result of an acquire attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireOutcome {
    /// Whether the caller now holds the lock
    pub granted: bool,

    /// Holder after the attempt
    pub locked_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of a heartbeat
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatOutcome {
    /// False when the caller no longer holds the lock; the client
    /// releases its local state on seeing this
    pub alive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Per-session mutual exclusion for interactive input
pub struct InputLockManager {
    locks: DashMap<String, InputLockState>,
    ttl: ChronoDuration,
    clock: SharedClock,
    bus: Arc<EventBus>,
}

impl InputLockManager {
    /// Manager with the given TTL in milliseconds
    pub fn new(clock: SharedClock, bus: Arc<EventBus>, ttl_ms: i64) -> Self {
        Self {
            locks: DashMap::new(),
            ttl: ChronoDuration::milliseconds(ttl_ms.max(1)),
            clock,
            bus,
        }
    }

    /// Manager with the default TTL
    pub fn with_default_ttl(clock: SharedClock, bus: Arc<EventBus>) -> Self {
        Self::new(clock, bus, DEFAULT_LOCK_TTL_MS)
    }

    /// Acquire the session's lock for a client. Re-acquiring by the
    /// current holder refreshes the expiry.
    pub fn acquire(&self, session_id: &str, client_id: &str) -> AcquireOutcome {
        let now = self.clock.now();
        let (outcome, changed) = {
            let mut entry = self
                .locks
                .entry(session_id.to_string())
                .or_insert_with(|| InputLockState::free(session_id));
            expire_in_place(&mut entry, now);

            match &entry.locked_by {
                Some(holder) if holder != client_id => (
                    AcquireOutcome {
                        granted: false,
                        locked_by: Some(holder.clone()),
                        expires_at: entry.expires_at,
                    },
                    false,
                ),
                _ => {
                    entry.locked_by = Some(client_id.to_string());
                    entry.locked_at = Some(now);
                    entry.last_heartbeat_at = Some(now);
                    entry.expires_at = Some(now + self.ttl);
                    (
                        AcquireOutcome {
                            granted: true,
                            locked_by: entry.locked_by.clone(),
                            expires_at: entry.expires_at,
                        },
                        true,
                    )
                }
            }
        };
        if changed {
            self.emit_lock_changed(session_id);
        }
        outcome
    }

    /// Extend the holder's expiry. A non-holder gets `alive: false`.
    pub fn heartbeat(&self, session_id: &str, client_id: &str) -> HeartbeatOutcome {
        let now = self.clock.now();
        let mut entry = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| InputLockState::free(session_id));
        expire_in_place(&mut entry, now);

        if entry.locked_by.as_deref() == Some(client_id) {
            entry.last_heartbeat_at = Some(now);
            entry.expires_at = Some(now + self.ttl);
            HeartbeatOutcome {
                alive: true,
                expires_at: entry.expires_at,
            }
        } else {
            HeartbeatOutcome {
                alive: false,
                expires_at: None,
            }
        }
    }

    /// Release the lock. Only the holder may release; releasing an
    /// unheld lock is an idempotent no-op.
    pub fn release(&self, session_id: &str, client_id: &str) -> bool {
        let released = {
            let mut entry = self
                .locks
                .entry(session_id.to_string())
                .or_insert_with(|| InputLockState::free(session_id));
            if entry.locked_by.as_deref() == Some(client_id) {
                *entry = InputLockState::free(session_id);
                true
            } else {
                entry.locked_by.is_none()
            }
        };
        if released {
            self.emit_lock_changed(session_id);
        }
        released
    }

    /// Update the typing flag; emitted only when the sender holds the lock
    pub fn set_typing(&self, session_id: &str, client_id: &str, typing: bool) -> bool {
        let is_holder = {
            let mut entry = self
                .locks
                .entry(session_id.to_string())
                .or_insert_with(|| InputLockState::free(session_id));
            expire_in_place(&mut entry, self.clock.now());
            if entry.locked_by.as_deref() == Some(client_id) {
                entry.typing = typing;
                true
            } else {
                false
            }
        };
        if is_holder {
            self.bus.emit(
                EventKind::TypingIndicator,
                Some(session_id.to_string()),
                None,
                json!({ "sessionId": session_id, "clientId": client_id, "typing": typing }),
            );
        }
        is_holder
    }

    /// Current lock state for a session (expiring lazily on read)
    pub fn state(&self, session_id: &str) -> InputLockState {
        let now = self.clock.now();
        match self.locks.get_mut(session_id) {
            Some(mut entry) => {
                let expired = expire_in_place(&mut entry, now);
                let state = entry.clone();
                drop(entry);
                if expired {
                    self.emit_lock_changed(session_id);
                }
                state
            }
            None => InputLockState::free(session_id),
        }
    }

    /// Sweep all sessions for expired locks
    pub fn expire_scan(&self) {
        let now = self.clock.now();
        let mut expired_sessions = Vec::new();
        for mut entry in self.locks.iter_mut() {
            if expire_in_place(&mut entry, now) {
                expired_sessions.push(entry.session_id.clone());
            }
        }
        for session_id in expired_sessions {
            debug!("input lock for session {} expired", session_id);
            self.emit_lock_changed(&session_id);
        }
    }

    /// Run the expiry scan on a fixed cadence
    pub fn spawn_expiry_task(self: &Arc<Self>, interval_ms: u64) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                ticker.tick().await;
                manager.expire_scan();
            }
        })
    }

    fn emit_lock_changed(&self, session_id: &str) {
        let state = self
            .locks
            .get(session_id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| InputLockState::free(session_id));
        self.bus.emit(
            EventKind::InputLockChanged,
            Some(session_id.to_string()),
            None,
            serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
        );
    }
}

/// Clear the lock when past expiry; returns whether state changed
fn expire_in_place(state: &mut InputLockState, now: DateTime<Utc>) -> bool {
    match (state.locked_by.as_ref(), state.expires_at) {
        (Some(_), Some(expires_at)) if now > expires_at => {
            let session_id = state.session_id.clone();
            *state = InputLockState::free(&session_id);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use finger_core::ManualClock;

    fn manager_with_manual_clock() -> (Arc<InputLockManager>, Arc<ManualClock>, Arc<EventBus>) {
        let clock = Arc::new(ManualClock::starting_at(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let shared: SharedClock = clock.clone();
        let bus = Arc::new(EventBus::new(shared.clone()));
        let manager = Arc::new(InputLockManager::with_default_ttl(shared, bus.clone()));
        (manager, clock, bus)
    }

    #[tokio::test]
    async fn test_acquire_release_acquire() {
        let (manager, _clock, _bus) = manager_with_manual_clock();

        assert!(manager.acquire("session-1", "client-a").granted);
        assert!(manager.release("session-1", "client-a"));
        assert!(manager.acquire("session-1", "client-a").granted);
    }

    #[tokio::test]
    async fn test_second_client_blocked_while_held() {
        let (manager, _clock, _bus) = manager_with_manual_clock();

        assert!(manager.acquire("session-1", "client-a").granted);
        let outcome = manager.acquire("session-1", "client-b");
        assert!(!outcome.granted);
        assert_eq!(outcome.locked_by.as_deref(), Some("client-a"));
    }

    #[tokio::test]
    async fn test_expiry_lets_second_client_in() {
        let (manager, clock, _bus) = manager_with_manual_clock();

        assert!(manager.acquire("session-1", "client-a").granted);
        clock.advance_millis(DEFAULT_LOCK_TTL_MS + 1);
        assert!(manager.acquire("session-1", "client-b").granted);
    }

    #[tokio::test]
    async fn test_heartbeat_extends_expiry() {
        let (manager, clock, _bus) = manager_with_manual_clock();

        assert!(manager.acquire("session-1", "client-a").granted);
        clock.advance_millis(DEFAULT_LOCK_TTL_MS - 1_000);
        assert!(manager.heartbeat("session-1", "client-a").alive);

        // The original TTL has long passed; the heartbeat kept it alive.
        clock.advance_millis(2_000);
        assert_eq!(
            manager.state("session-1").locked_by.as_deref(),
            Some("client-a")
        );
    }

    #[tokio::test]
    async fn test_heartbeat_from_non_holder_reports_dead() {
        let (manager, _clock, _bus) = manager_with_manual_clock();

        assert!(manager.acquire("session-1", "client-a").granted);
        assert!(!manager.heartbeat("session-1", "client-b").alive);
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_refused() {
        let (manager, _clock, _bus) = manager_with_manual_clock();

        assert!(manager.acquire("session-1", "client-a").granted);
        assert!(!manager.release("session-1", "client-b"));
        assert_eq!(
            manager.state("session-1").locked_by.as_deref(),
            Some("client-a")
        );
    }

    #[tokio::test]
    async fn test_release_idempotent_when_unheld() {
        let (manager, _clock, _bus) = manager_with_manual_clock();
        assert!(manager.release("session-1", "client-a"));
    }

    #[tokio::test]
    async fn test_typing_only_from_holder() {
        let (manager, _clock, bus) = manager_with_manual_clock();
        let mut stream = bus.subscribe();

        manager.acquire("session-1", "client-a");
        let _ = stream.next().await; // input_lock_changed from acquire

        assert!(!manager.set_typing("session-1", "client-b", true));
        assert!(manager.set_typing("session-1", "client-a", true));

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, EventKind::TypingIndicator);
        assert_eq!(event.payload["clientId"], "client-a");
        assert_eq!(event.payload["typing"], true);
    }

    #[tokio::test]
    async fn test_expire_scan_emits_change() {
        let (manager, clock, bus) = manager_with_manual_clock();
        let mut stream = bus.subscribe();

        manager.acquire("session-1", "client-a");
        let _ = stream.next().await;

        clock.advance_millis(DEFAULT_LOCK_TTL_MS + 1);
        manager.expire_scan();

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, EventKind::InputLockChanged);
        assert!(event.payload["lockedBy"].is_null());
    }
}
