//! Assignment lifecycle - per-dispatch review/retry sub-state
//!
//! Every dispatch event carries an assignment. The phase walks
//! assigned → queued → started → (reviewing | closed | failed), with
//! reviewing resolving to retry, passed, or failed. A retry rewinds to
//! queued when the caller resubmits.

use serde::{Deserialize, Serialize};

/// Phase of an assignment within the review/retry lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentPhase {
    Assigned,
    Queued,
    Started,
    Reviewing,
    Retry,
    Passed,
    Failed,
    Closed,
}

impl AssignmentPhase {
    /// Whether a transition from `self` to `next` is legal
    pub fn can_transition_to(&self, next: AssignmentPhase) -> bool {
        use AssignmentPhase::*;
        matches!(
            (self, next),
            (Assigned, Queued)
                | (Queued, Started)
                | (Started, Reviewing)
                | (Started, Closed)
                | (Started, Failed)
                | (Reviewing, Retry)
                | (Reviewing, Passed)
                | (Reviewing, Failed)
                | (Retry, Queued)
        )
    }

    /// Whether the phase is terminal for a single dispatch
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Closed)
    }
}

/// Map a reply's `reviewDecision` field to the terminal phase of a
/// successfully completed dispatch.
pub fn terminal_phase_from_review(review_decision: Option<&str>) -> AssignmentPhase {
    match review_decision.map(|d| d.to_lowercase()) {
        Some(d) if matches!(d.as_str(), "pass" | "passed" | "approved") => AssignmentPhase::Passed,
        Some(d) if matches!(d.as_str(), "retry" | "rework" | "reject") => AssignmentPhase::Retry,
        Some(d) if d == "reviewing" => AssignmentPhase::Reviewing,
        _ => AssignmentPhase::Closed,
    }
}

/// Per-dispatch assignment attached to every dispatch event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Epic the task belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,

    /// Task id within the epic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Breakdown task id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bd_task_id: Option<String>,

    /// Agent that assigned the work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigner_agent_id: Option<String>,

    /// Agent the work is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_agent_id: Option<String>,

    /// Current lifecycle phase
    pub phase: AssignmentPhase,

    /// Attempt number, at least 1
    #[serde(default = "default_attempt")]
    pub attempt: u32,
}

fn default_attempt() -> u32 {
    1
}

impl Assignment {
    /// Assignment seeded for a fresh dispatch between two agents
    pub fn for_dispatch(source_agent_id: &str, target_agent_id: &str) -> Self {
        Self {
            epic_id: None,
            task_id: None,
            bd_task_id: None,
            assigner_agent_id: Some(source_agent_id.to_string()),
            assignee_agent_id: Some(target_agent_id.to_string()),
            phase: AssignmentPhase::Assigned,
            attempt: 1,
        }
    }

    /// Copy of this assignment at a different phase
    pub fn with_phase(&self, phase: AssignmentPhase) -> Self {
        let mut next = self.clone();
        next.phase = phase;
        next
    }
}
