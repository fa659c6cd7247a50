//! Control plane - pause / resume / interrupt / cancel / status
//!
//! The scheduler's state is this component's read model; every control
//! call emits an `agent_runtime_control` event, and `status` adds an
//! `agent_runtime_status` event. State-read trouble during `status`
//! never propagates: it comes back as a failed result plus an error
//! status event.

use crate::bus::EventBus;
use crate::runner::{AgentRunner, WorkflowControl};
use crate::scheduler::{CatalogLayer, DispatchScheduler};
use finger_core::{
    ControlAction, ControlEventPayload, ControlRequest, ControlResult, EventKind, LastEventKind,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Control plane over the scheduler, runner, and workflow engine
pub struct ControlPlane {
    scheduler: Arc<DispatchScheduler>,
    runner: Arc<dyn AgentRunner>,
    workflow: Arc<dyn WorkflowControl>,
    bus: Arc<EventBus>,
}

impl ControlPlane {
    /// Wire the control plane to its collaborators
    pub fn new(
        scheduler: Arc<DispatchScheduler>,
        runner: Arc<dyn AgentRunner>,
        workflow: Arc<dyn WorkflowControl>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            scheduler,
            runner,
            workflow,
            bus,
        }
    }

    /// Handle one control request. Always returns a result envelope and
    /// always emits a control event.
    pub async fn handle(&self, request: ControlRequest) -> ControlResult {
        let result = match request.parsed_action() {
            Some(ControlAction::Status) => self.handle_status(&request).await,
            Some(ControlAction::Pause) => self.handle_pause(&request).await,
            Some(ControlAction::Resume) => self.handle_resume(&request).await,
            Some(ControlAction::Interrupt) | Some(ControlAction::Cancel) => {
                self.handle_interrupt(&request).await
            }
            None => ControlResult::failed(&request.action, "unsupported control action"),
        };

        self.record_last_event(&request, &result);
        self.emit_control_event(&request, &result);
        result
    }

    async fn handle_status(&self, request: &ControlRequest) -> ControlResult {
        let snapshot = async {
            let catalog = self.scheduler.catalog(CatalogLayer::Full);
            let runtime_view = self.scheduler.runtime_view();
            let runner_sessions = self.runner.session_states().await?;
            Ok::<Value, finger_core::FingerError>(json!({
                "catalog": catalog,
                "runtimeView": runtime_view,
                "runnerSessions": runner_sessions,
            }))
        }
        .await;

        match snapshot {
            Ok(value) => {
                self.emit_status_event(request, "completed", None);
                ControlResult::completed("status", Some(value))
            }
            Err(err) => {
                let message = err.to_string();
                warn!("control status snapshot failed: {}", message);
                self.emit_status_event(request, "failed", Some(message.clone()));
                ControlResult::failed("status", message)
            }
        }
    }

    async fn handle_pause(&self, request: &ControlRequest) -> ControlResult {
        if let Some(workflow_id) = &request.workflow_id {
            return match self.workflow.pause_workflow(workflow_id, request.hard).await {
                Ok(true) => {
                    info!("paused workflow {}", workflow_id);
                    ControlResult::completed("pause", None)
                        .with_workflow(Some(workflow_id.clone()))
                }
                Ok(false) => ControlResult::failed("pause", "workflow not found")
                    .with_workflow(Some(workflow_id.clone())),
                Err(err) => ControlResult::failed("pause", err.to_string())
                    .with_workflow(Some(workflow_id.clone())),
            };
        }
        if let Some(session_id) = &request.session_id {
            return match self.workflow.pause_session(session_id).await {
                Ok(true) => ControlResult::completed("pause", None)
                    .with_session(Some(session_id.clone())),
                Ok(false) => ControlResult::failed("pause", "session not found")
                    .with_session(Some(session_id.clone())),
                Err(err) => ControlResult::failed("pause", err.to_string())
                    .with_session(Some(session_id.clone())),
            };
        }
        ControlResult::failed("pause", "pause requires sessionId or workflowId")
    }

    async fn handle_resume(&self, request: &ControlRequest) -> ControlResult {
        if let Some(workflow_id) = &request.workflow_id {
            return match self.workflow.resume_workflow(workflow_id).await {
                Ok(true) => {
                    info!("resumed workflow {}", workflow_id);
                    ControlResult::completed("resume", None)
                        .with_workflow(Some(workflow_id.clone()))
                }
                Ok(false) => ControlResult::failed("resume", "workflow not found")
                    .with_workflow(Some(workflow_id.clone())),
                Err(err) => ControlResult::failed("resume", err.to_string())
                    .with_workflow(Some(workflow_id.clone())),
            };
        }
        if let Some(session_id) = &request.session_id {
            return match self.workflow.resume_session(session_id).await {
                Ok(true) => ControlResult::completed("resume", None)
                    .with_session(Some(session_id.clone())),
                Ok(false) => ControlResult::failed("resume", "session not found")
                    .with_session(Some(session_id.clone())),
                Err(err) => ControlResult::failed("resume", err.to_string())
                    .with_session(Some(session_id.clone())),
            };
        }
        ControlResult::failed("resume", "resume requires sessionId or workflowId")
    }

    async fn handle_interrupt(&self, request: &ControlRequest) -> ControlResult {
        let Some(session_id) = &request.session_id else {
            return ControlResult::failed(
                &request.action,
                format!("{} requires sessionId", request.action),
            );
        };
        match self
            .runner
            .interrupt_session(session_id, request.provider_id.as_deref())
            .await
        {
            Ok(outcome) => {
                info!(
                    "interrupted {} turn(s) in session {}",
                    outcome.interrupted_count, session_id
                );
                ControlResult::completed(
                    &request.action,
                    Some(serde_json::to_value(&outcome).unwrap_or(Value::Null)),
                )
                .with_session(Some(session_id.clone()))
            }
            Err(err) => ControlResult::failed(&request.action, err.to_string())
                .with_session(Some(session_id.clone())),
        }
    }

    /// Record the control outcome in the per-agent last-event store.
    /// Successful interrupt/cancel statuses are normalised to
    /// `interrupted`.
    fn record_last_event(&self, request: &ControlRequest, result: &ControlResult) {
        let status = if result.ok
            && matches!(
                request.parsed_action(),
                Some(ControlAction::Interrupt) | Some(ControlAction::Cancel)
            ) {
            "interrupted".to_string()
        } else if result.ok {
            "completed".to_string()
        } else {
            "failed".to_string()
        };

        let mut agents: Vec<String> = Vec::new();
        if let Some(agent_id) = &request.target_agent_id {
            agents.push(agent_id.clone());
        } else if let Some(session_id) = &request.session_id {
            agents.extend(self.scheduler.agents_in_session(session_id));
        }
        for agent_id in agents {
            self.scheduler.last_events().record(
                &agent_id,
                LastEventKind::Control,
                status.clone(),
                format!("control {}", request.action),
                request.session_id.clone(),
                request.workflow_id.clone(),
                None,
            );
        }
    }

    fn emit_control_event(&self, request: &ControlRequest, result: &ControlResult) {
        let payload = ControlEventPayload {
            action: request.action.clone(),
            status: match result.status {
                finger_core::ControlStatus::Accepted => "accepted".to_string(),
                finger_core::ControlStatus::Completed => "completed".to_string(),
                finger_core::ControlStatus::Failed => "failed".to_string(),
            },
            target_agent_id: request.target_agent_id.clone(),
            workflow_id: request.workflow_id.clone(),
            error: result.error.clone(),
        };
        self.bus.emit(
            EventKind::AgentRuntimeControl,
            request.session_id.clone(),
            request.target_agent_id.clone(),
            serde_json::to_value(payload).unwrap_or(Value::Null),
        );
    }

    fn emit_status_event(&self, request: &ControlRequest, status: &str, error: Option<String>) {
        self.bus.emit(
            EventKind::AgentRuntimeStatus,
            request.session_id.clone(),
            request.target_agent_id.clone(),
            json!({ "status": status, "error": error }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MessageHub;
    use crate::registry::ConfigStore;
    use crate::runner::{NullAgentRunner, NullWorkflowControl};
    use async_trait::async_trait;
    use finger_core::{system_clock, FingerResult, InterruptOutcome};

    struct OneSessionRunner;

    #[async_trait]
    impl AgentRunner for OneSessionRunner {
        async fn interrupt_session(
            &self,
            session_id: &str,
            _provider_id: Option<&str>,
        ) -> FingerResult<InterruptOutcome> {
            Ok(InterruptOutcome {
                interrupted_count: 1,
                sessions: vec![session_id.to_string()],
            })
        }

        async fn session_states(&self) -> FingerResult<Value> {
            Ok(json!([{ "sessionId": "session-1", "state": "running" }]))
        }
    }

    fn control_plane(runner: Arc<dyn AgentRunner>) -> (ControlPlane, Arc<EventBus>) {
        let clock = system_clock();
        let bus = Arc::new(EventBus::new(clock.clone()));
        let hub = Arc::new(MessageHub::default());
        let configs = Arc::new(ConfigStore::new());
        let scheduler = Arc::new(DispatchScheduler::new(
            clock,
            bus.clone(),
            hub,
            configs,
        ));
        (
            ControlPlane::new(
                scheduler,
                runner,
                Arc::new(NullWorkflowControl),
                bus.clone(),
            ),
            bus,
        )
    }

    fn request(action: &str) -> ControlRequest {
        ControlRequest {
            action: action.to_string(),
            target_agent_id: None,
            session_id: None,
            workflow_id: None,
            provider_id: None,
            hard: false,
        }
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let (plane, bus) = control_plane(Arc::new(NullAgentRunner));
        let mut stream = bus.subscribe();

        let result = plane.handle(request("reboot")).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("unsupported control action"));

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, EventKind::AgentRuntimeControl);
        assert_eq!(event.payload["status"], "failed");
    }

    #[tokio::test]
    async fn test_pause_without_target_fails() {
        let (plane, _bus) = control_plane(Arc::new(NullAgentRunner));
        let result = plane.handle(request("pause")).await;
        assert!(!result.ok);
        assert_eq!(
            result.error.as_deref(),
            Some("pause requires sessionId or workflowId")
        );
    }

    #[tokio::test]
    async fn test_pause_unknown_workflow() {
        let (plane, _bus) = control_plane(Arc::new(NullAgentRunner));
        let mut req = request("pause");
        req.workflow_id = Some("wf-missing".to_string());
        let result = plane.handle(req).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("workflow not found"));
    }

    #[tokio::test]
    async fn test_interrupt_returns_outcome() {
        let (plane, _bus) = control_plane(Arc::new(OneSessionRunner));
        let mut req = request("interrupt");
        req.session_id = Some("session-1".to_string());

        let result = plane.handle(req).await;
        assert!(result.ok);
        let outcome = result.result.unwrap();
        assert_eq!(outcome["interruptedCount"], 1);
        assert_eq!(outcome["sessions"][0], "session-1");
    }

    #[tokio::test]
    async fn test_interrupt_requires_session() {
        let (plane, _bus) = control_plane(Arc::new(OneSessionRunner));
        let result = plane.handle(request("interrupt")).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("interrupt requires sessionId"));
    }

    #[tokio::test]
    async fn test_status_snapshot_shape() {
        let (plane, bus) = control_plane(Arc::new(OneSessionRunner));
        let mut stream = bus.subscribe();

        let result = plane.handle(request("status")).await;
        assert!(result.ok);
        let snapshot = result.result.unwrap();
        assert!(snapshot.get("catalog").is_some());
        assert!(snapshot.get("runtimeView").is_some());
        assert!(snapshot.get("runnerSessions").is_some());

        // status action emits a status event followed by the control event
        let first = stream.next().await.unwrap();
        assert_eq!(first.kind, EventKind::AgentRuntimeStatus);
        let second = stream.next().await.unwrap();
        assert_eq!(second.kind, EventKind::AgentRuntimeControl);
    }
}
