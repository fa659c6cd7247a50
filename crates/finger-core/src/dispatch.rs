//! Dispatch request/result contract
//!
//! A dispatch is a single request to execute a task on a target agent.
//! Results are modelled as a tagged outcome internally with a flat DTO
//! for JSON serialisation at the boundary.

use crate::assignment::Assignment;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default queue wait before a queued dispatch times out
pub const DEFAULT_MAX_QUEUE_WAIT_MS: u64 = 300_000;

/// Lower clamp for caller-supplied queue waits
pub const MIN_QUEUE_WAIT_MS: u64 = 1_000;

/// Task payload of a dispatch: either plain text or a structured object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskPayload {
    /// Plain text task, wrapped as `{text, sessionId?, metadata}` on send
    Text(String),
    /// Structured task; cloned and merged with dispatch metadata on send
    Object(Map<String, Value>),
}

/// Request to dispatch a task to a target agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Dispatching agent
    pub source_agent_id: String,

    /// Target agent
    pub target_agent_id: String,

    /// Task to execute
    pub task: TaskPayload,

    /// Session context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Workflow context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    /// Extra metadata merged into the module payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    /// Blocking callers wait for the terminal result
    #[serde(default)]
    pub blocking: bool,

    /// Whether a busy target queues the dispatch (default) or refuses it
    #[serde(default = "default_queue_on_busy")]
    pub queue_on_busy: bool,

    /// Maximum queue wait in milliseconds; clamped by `normalized_queue_wait_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_wait_ms: Option<f64>,

    /// Assignment carried through the dispatch lifecycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

fn default_queue_on_busy() -> bool {
    true
}

impl DispatchRequest {
    /// Minimal request between two agents with a text task
    pub fn text(source: impl Into<String>, target: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            source_agent_id: source.into(),
            target_agent_id: target.into(),
            task: TaskPayload::Text(task.into()),
            session_id: None,
            workflow_id: None,
            metadata: None,
            blocking: false,
            queue_on_busy: true,
            max_queue_wait_ms: None,
            assignment: None,
        }
    }

    /// Queue wait normalised per contract: non-finite values fall back
    /// to the default, values under one second clamp to one second.
    pub fn normalized_queue_wait_ms(&self) -> u64 {
        match self.max_queue_wait_ms {
            Some(ms) if ms.is_finite() => (ms.max(0.0) as u64).max(MIN_QUEUE_WAIT_MS),
            Some(_) => DEFAULT_MAX_QUEUE_WAIT_MS,
            None => DEFAULT_MAX_QUEUE_WAIT_MS,
        }
    }
}

/// Dispatch-level status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Queued,
    Completed,
    Failed,
}

/// Terminal (or queued) outcome of a dispatch, tagged internally
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Accepted: queued at the given position, or already running in the
    /// background for admitted non-blocking dispatches
    Queued { queue_position: Option<usize> },
    /// Completed with the module's reply
    Completed { result: Value },
    /// Failed with a surfaced message
    Failed { error: String },
}

/// Flat result DTO returned to callers and serialised over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// Whether the dispatch succeeded (queued counts as ok)
    pub ok: bool,

    /// Dispatch id, unique within process lifetime
    pub dispatch_id: String,

    /// Dispatch-level status
    pub status: DispatchStatus,

    /// Module reply, for completed dispatches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Resolved target module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_module_id: Option<String>,

    /// Queue position, for queued results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

impl DispatchResult {
    /// Build the flat DTO from a tagged outcome
    pub fn from_outcome(
        dispatch_id: impl Into<String>,
        target_module_id: Option<String>,
        outcome: DispatchOutcome,
    ) -> Self {
        let dispatch_id = dispatch_id.into();
        match outcome {
            DispatchOutcome::Queued { queue_position } => Self {
                ok: true,
                dispatch_id,
                status: DispatchStatus::Queued,
                result: None,
                error: None,
                target_module_id,
                queue_position,
            },
            DispatchOutcome::Completed { result } => Self {
                ok: true,
                dispatch_id,
                status: DispatchStatus::Completed,
                result: Some(result),
                error: None,
                target_module_id,
                queue_position: None,
            },
            DispatchOutcome::Failed { error } => Self {
                ok: false,
                dispatch_id,
                status: DispatchStatus::Failed,
                result: None,
                error: Some(error),
                target_module_id,
                queue_position: None,
            },
        }
    }

    /// Failed result with no module resolution
    pub fn failed(dispatch_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::from_outcome(
            dispatch_id,
            None,
            DispatchOutcome::Failed {
                error: error.into(),
            },
        )
    }
}

/// New dispatch id: `dispatch-<epochMs>-<6 random base36 chars>`
pub fn new_dispatch_id(epoch_millis: u64) -> String {
    const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("dispatch-{}-{}", epoch_millis, suffix)
}
