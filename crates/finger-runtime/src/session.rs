//! Session workspace - orchestrator root and runtime child sessions
//!
//! Sessions form a two-level tree: one orchestrator root plus one child
//! per sub-agent. Orchestrator-role deployments target the root; every
//! other role targets a child derived from the root. The workspace also
//! resolves the per-session diagnostics directory callers use for loop
//! logs.

use dashmap::DashMap;
use finger_core::{FingerError, FingerResult, SharedClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Kind of a session in the workspace tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    /// The single orchestrator root
    OrchestratorRoot,
    /// Per-sub-agent child of the root
    RuntimeChild,
    /// Externally created session
    Plain,
}

/// One session in the workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session id
    pub id: String,

    /// Tree position
    pub kind: SessionKind,

    /// Parent session, for children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Agent a runtime child belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Creation time
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Parent/child session lifecycle for sub-agents
pub struct SessionWorkspace {
    home: PathBuf,
    clock: SharedClock,
    sessions: DashMap<String, SessionRecord>,
    root_id: Mutex<Option<String>>,
    current_id: Mutex<Option<String>>,
}

impl SessionWorkspace {
    /// Workspace rooted at the finger home directory
    pub fn new(home: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            home: home.into(),
            clock,
            sessions: DashMap::new(),
            root_id: Mutex::new(None),
            current_id: Mutex::new(None),
        }
    }

    /// Return the orchestrator root session, creating it on first call
    pub fn ensure_orchestrator_root_session(&self) -> SessionRecord {
        let mut root_id = self.root_id.lock();
        if let Some(id) = root_id.as_ref() {
            if let Some(existing) = self.sessions.get(id) {
                return existing.value().clone();
            }
        }
        let record = SessionRecord {
            id: format!("orchestrator-root-{}", Uuid::new_v4()),
            kind: SessionKind::OrchestratorRoot,
            parent_id: None,
            agent_id: None,
            created_at: self.clock.now(),
        };
        info!("created orchestrator root session {}", record.id);
        self.sessions.insert(record.id.clone(), record.clone());
        *root_id = Some(record.id.clone());
        record
    }

    /// Return the runtime child session for an agent under the given
    /// root, creating it on first call. Matching is by parent + agent.
    pub fn ensure_runtime_child_session(
        &self,
        root: &SessionRecord,
        agent_id: &str,
    ) -> SessionRecord {
        if let Some(existing) = self.sessions.iter().find(|s| {
            s.value().kind == SessionKind::RuntimeChild
                && s.value().parent_id.as_deref() == Some(root.id.as_str())
                && s.value().agent_id.as_deref() == Some(agent_id)
        }) {
            return existing.value().clone();
        }
        let record = SessionRecord {
            id: format!("runtime-{}-{}", agent_id, Uuid::new_v4()),
            kind: SessionKind::RuntimeChild,
            parent_id: Some(root.id.clone()),
            agent_id: Some(agent_id.to_string()),
            created_at: self.clock.now(),
        };
        debug!("created runtime child session {} for {}", record.id, agent_id);
        self.sessions.insert(record.id.clone(), record.clone());
        record
    }

    /// Whether the session is a runtime child
    pub fn is_runtime_child_session(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|s| s.value().kind == SessionKind::RuntimeChild)
            .unwrap_or(false)
    }

    /// Session lookup
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Register an externally created session
    pub fn register_plain(&self, session_id: &str) -> SessionRecord {
        if let Some(existing) = self.sessions.get(session_id) {
            return existing.value().clone();
        }
        let record = SessionRecord {
            id: session_id.to_string(),
            kind: SessionKind::Plain,
            parent_id: None,
            agent_id: None,
            created_at: self.clock.now(),
        };
        self.sessions.insert(record.id.clone(), record.clone());
        record
    }

    /// Set the current session (the applier points this at the root)
    pub fn set_current_session(&self, session_id: Option<String>) {
        *self.current_id.lock() = session_id;
    }

    /// Current session id
    pub fn current_session(&self) -> Option<String> {
        self.current_id.lock().clone()
    }

    /// Per-session diagnostics directory, created on demand
    pub fn resolve_session_workspace_dirs_for_message(
        &self,
        session_id: &str,
    ) -> FingerResult<PathBuf> {
        let dir = self
            .home
            .join("sessions")
            .join(sanitize_path_component(session_id))
            .join("diagnostics");
        std::fs::create_dir_all(&dir)
            .map_err(|e| FingerError::Io(e))
            .map(|_| dir)
    }

    /// Append-only loop log path for an agent within a session
    pub fn diagnostics_log_path(
        &self,
        session_id: &str,
        agent_id: &str,
    ) -> FingerResult<PathBuf> {
        let dir = self.resolve_session_workspace_dirs_for_message(session_id)?;
        Ok(dir.join(format!("{}.loop.jsonl", sanitize_path_component(agent_id))))
    }

    /// Finger home directory backing the workspace
    pub fn home(&self) -> &Path {
        &self.home
    }
}

fn sanitize_path_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
