//! Collaborator traits - the runner and workflow engine seams
//!
//! The core never talks to provider kernels directly. It consumes an
//! `AgentRunner` for interrupting in-flight turns and reading session
//! states, and a `WorkflowControl` for pause/resume. Null
//! implementations keep the broker bootable without either collaborator.

use async_trait::async_trait;
use finger_core::{FingerResult, InterruptOutcome};
use serde_json::Value;

/// Interface to the agent runner hosting chat turns
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Interrupt every in-flight turn of a session
    async fn interrupt_session(
        &self,
        session_id: &str,
        provider_id: Option<&str>,
    ) -> FingerResult<InterruptOutcome>;

    /// Snapshot of runner session states for `control.status`
    async fn session_states(&self) -> FingerResult<Value>;
}

/// Interface to the workflow engine for pause/resume control
#[async_trait]
pub trait WorkflowControl: Send + Sync {
    /// Pause a workflow; `false` when the workflow does not exist
    async fn pause_workflow(&self, workflow_id: &str, hard: bool) -> FingerResult<bool>;

    /// Resume a workflow; `false` when the workflow does not exist
    async fn resume_workflow(&self, workflow_id: &str) -> FingerResult<bool>;

    /// Pause a session; `false` when the session does not exist
    async fn pause_session(&self, session_id: &str) -> FingerResult<bool>;

    /// Resume a session; `false` when the session does not exist
    async fn resume_session(&self, session_id: &str) -> FingerResult<bool>;
}

/// Read model for status derivation: whether a workflow task currently
/// references an agent
pub trait WorkflowStatusProvider: Send + Sync {
    /// True when an in-progress workflow task references the agent
    fn has_in_progress_task_for(&self, agent_id: &str) -> bool;
}

/// Runner stand-in used when no provider kernel is attached
#[derive(Debug, Default)]
pub struct NullAgentRunner;

#[async_trait]
impl AgentRunner for NullAgentRunner {
    async fn interrupt_session(
        &self,
        session_id: &str,
        _provider_id: Option<&str>,
    ) -> FingerResult<InterruptOutcome> {
        Ok(InterruptOutcome {
            interrupted_count: 0,
            sessions: vec![session_id.to_string()],
        })
    }

    async fn session_states(&self) -> FingerResult<Value> {
        Ok(Value::Array(Vec::new()))
    }
}

/// Workflow stand-in used when no workflow engine is attached
#[derive(Debug, Default)]
pub struct NullWorkflowControl;

#[async_trait]
impl WorkflowControl for NullWorkflowControl {
    async fn pause_workflow(&self, _workflow_id: &str, _hard: bool) -> FingerResult<bool> {
        Ok(false)
    }

    async fn resume_workflow(&self, _workflow_id: &str) -> FingerResult<bool> {
        Ok(false)
    }

    async fn pause_session(&self, _session_id: &str) -> FingerResult<bool> {
        Ok(false)
    }

    async fn resume_session(&self, _session_id: &str) -> FingerResult<bool> {
        Ok(false)
    }
}
