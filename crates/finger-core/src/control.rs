//! Control plane request/result contract

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control actions accepted by the control plane
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Status,
    Pause,
    Resume,
    Interrupt,
    Cancel,
}

impl ControlAction {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Interrupt => "interrupt",
            Self::Cancel => "cancel",
        }
    }
}

/// A control request against the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    /// Action name; unknown names fail with `unsupported control action`
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    /// Provider hint forwarded to the runner on interrupt/cancel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Hard pause stops in-flight steps instead of finishing them
    #[serde(default)]
    pub hard: bool,
}

impl ControlRequest {
    /// Parse the action name; `None` for unsupported actions
    pub fn parsed_action(&self) -> Option<ControlAction> {
        match self.action.as_str() {
            "status" => Some(ControlAction::Status),
            "pause" => Some(ControlAction::Pause),
            "resume" => Some(ControlAction::Resume),
            "interrupt" => Some(ControlAction::Interrupt),
            "cancel" => Some(ControlAction::Cancel),
            _ => None,
        }
    }
}

/// Status of a control result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    Accepted,
    Completed,
    Failed,
}

/// Result envelope for control operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResult {
    /// Whether the action succeeded
    pub ok: bool,

    /// Echo of the requested action
    pub action: String,

    /// Result status
    pub status: ControlStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    /// Action-specific result payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResult {
    /// Successful completed result
    pub fn completed(action: &str, result: Option<Value>) -> Self {
        Self {
            ok: true,
            action: action.to_string(),
            status: ControlStatus::Completed,
            target_agent_id: None,
            session_id: None,
            workflow_id: None,
            result,
            error: None,
        }
    }

    /// Failed result with a surfaced message
    pub fn failed(action: &str, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            action: action.to_string(),
            status: ControlStatus::Failed,
            target_agent_id: None,
            session_id: None,
            workflow_id: None,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Attach session context
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Attach workflow context
    pub fn with_workflow(mut self, workflow_id: Option<String>) -> Self {
        self.workflow_id = workflow_id;
        self
    }
}

/// Outcome of interrupting a session's in-flight turns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptOutcome {
    /// Number of turns interrupted
    pub interrupted_count: usize,

    /// Session ids touched by the interrupt
    pub sessions: Vec<String>,
}
