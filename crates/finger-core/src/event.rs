//! Runtime events - the publication contract of the broker
//!
//! Every scheduler decision, control action, and runner-side turn event
//! surfaces as a `RuntimeEvent`. The bus guarantees per-subscriber
//! emission order; subscribers (the WebSocket fan-out chief among them)
//! see `{type, payload, sessionId, timestamp, agentId?}` frames.

use crate::assignment::Assignment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session id used when an event has no session context
pub const DEFAULT_SESSION_ID: &str = "default";

/// Kinds of events the runtime produces or re-emits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentRuntimeCatalog,
    AgentRuntimeDispatch,
    AgentRuntimeControl,
    AgentRuntimeStatus,
    ToolCall,
    ToolResult,
    ToolError,
    ChatCodexTurn,
    AssistantChunk,
    AssistantComplete,
    PhaseTransition,
    WorkflowUpdate,
    AgentUpdate,
    UserMessage,
    InputLockChanged,
    TypingIndicator,
}

impl EventKind {
    /// Wire name of the event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentRuntimeCatalog => "agent_runtime_catalog",
            Self::AgentRuntimeDispatch => "agent_runtime_dispatch",
            Self::AgentRuntimeControl => "agent_runtime_control",
            Self::AgentRuntimeStatus => "agent_runtime_status",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::ToolError => "tool_error",
            Self::ChatCodexTurn => "chat_codex_turn",
            Self::AssistantChunk => "assistant_chunk",
            Self::AssistantComplete => "assistant_complete",
            Self::PhaseTransition => "phase_transition",
            Self::WorkflowUpdate => "workflow_update",
            Self::AgentUpdate => "agent_update",
            Self::UserMessage => "user_message",
            Self::InputLockChanged => "input_lock_changed",
            Self::TypingIndicator => "typing_indicator",
        }
    }
}

/// A single published event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEvent {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Session the event belongs to; defaults to `"default"`
    pub session_id: String,

    /// Wall-clock emission time, serialised as ISO-8601
    pub timestamp: DateTime<Utc>,

    /// Agent the event concerns, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Kind-specific payload
    pub payload: Value,
}

impl RuntimeEvent {
    /// Build an event, defaulting the session id when none is given
    pub fn new(
        kind: EventKind,
        session_id: Option<String>,
        timestamp: DateTime<Utc>,
        agent_id: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
            timestamp,
            agent_id,
            payload,
        }
    }
}

/// Payload of an `agent_runtime_dispatch` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEventPayload {
    /// Dispatch id the event belongs to
    pub dispatch_id: String,

    /// Dispatching agent
    pub source_agent_id: String,

    /// Target agent
    pub target_agent_id: String,

    /// Dispatch-level status: queued, completed, or failed
    pub status: String,

    /// Assignment snapshot at emission time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,

    /// Position in the target queue, for queued emissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,

    /// Workflow context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    /// Failure message, for failed emissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of an `agent_runtime_control` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEventPayload {
    /// Control action name
    pub action: String,

    /// Result status: accepted, completed, or failed
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Kind bucket recorded in the per-agent last-event store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LastEventKind {
    Dispatch,
    Control,
    Status,
}

/// Most recent runtime activity observed for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLastEvent {
    /// Which family of event touched the agent last
    pub kind: LastEventKind,

    /// Status string at emission (e.g. "completed", "interrupted")
    pub status: String,

    /// Short human-readable summary
    pub summary: String,

    /// Emission time
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<String>,
}
