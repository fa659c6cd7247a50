//! Dispatch scheduler - capacity-bounded, queued, deadlock-aware
//!
//! Admission, completion, timeout, and drain all take the per-agent
//! lane lock; operations on different agents proceed in parallel. Event
//! emission happens outside the critical section. Every admitted
//! dispatch produces exactly one terminal event, preceded by a
//! `queued` event carrying the started phase (and, when the dispatch
//! waited, one carrying the queued phase before that).

use crate::bus::EventBus;
use crate::error_samples::ErrorSampleWriter;
use crate::hub::MessageHub;
use crate::last_event::LastEventStore;
use crate::registry::{build_definitions_with_baseline, ConfigStore};
use crate::runner::WorkflowStatusProvider;
use dashmap::DashMap;
use finger_core::{
    deployment_id, new_dispatch_id, resolve_quota, startup_templates, Assignment,
    AssignmentPhase, DeployRequest, DeploymentRecord, DeploymentStatus, DispatchEventPayload,
    DispatchOutcome, DispatchRequest, DispatchResult, EventKind, FingerError, FingerResult,
    ImplStatus, LastEventKind, QuotaView, RuntimeProfile, SharedClock, TaskPayload,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Derived per-agent status for catalog views
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Error,
    Running,
    Queued,
    Paused,
    WaitingInput,
    Completed,
    Interrupted,
    Idle,
}

/// Capability layers of the catalog view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CatalogLayer {
    Summary,
    Execution,
    Governance,
    Full,
}

impl CatalogLayer {
    /// Parse the HTTP query value; unknown layers fall back to summary
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("execution") => Self::Execution,
            Some("governance") => Self::Governance,
            Some("full") => Self::Full,
            _ => Self::Summary,
        }
    }
}

struct QueuedItem {
    dispatch_id: String,
    request: DispatchRequest,
    target_module_id: String,
    assignment: Assignment,
    tx: Option<oneshot::Sender<DispatchResult>>,
    timer: Option<AbortHandle>,
}

#[derive(Default)]
struct Lane {
    active: u32,
    queue: VecDeque<QueuedItem>,
}

enum Admission {
    Admit,
    Queued { position: usize },
    Rejected(&'static str),
}

/// The dispatch scheduler: deployments, profiles, per-agent lanes, and
/// the last-event read model
pub struct DispatchScheduler {
    clock: SharedClock,
    bus: Arc<EventBus>,
    hub: Arc<MessageHub>,
    configs: Arc<ConfigStore>,
    deployments: DashMap<String, DeploymentRecord>,
    profiles: DashMap<String, RuntimeProfile>,
    lanes: DashMap<String, Arc<Mutex<Lane>>>,
    last_events: LastEventStore,
    workflow_status: parking_lot::RwLock<Option<Arc<dyn WorkflowStatusProvider>>>,
    error_samples: parking_lot::RwLock<Option<Arc<ErrorSampleWriter>>>,
    detached: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchScheduler {
    /// Create a scheduler bound to a bus, hub, and config store
    pub fn new(
        clock: SharedClock,
        bus: Arc<EventBus>,
        hub: Arc<MessageHub>,
        configs: Arc<ConfigStore>,
    ) -> Self {
        Self {
            last_events: LastEventStore::new(clock.clone()),
            clock,
            bus,
            hub,
            configs,
            deployments: DashMap::new(),
            profiles: DashMap::new(),
            lanes: DashMap::new(),
            workflow_status: parking_lot::RwLock::new(None),
            error_samples: parking_lot::RwLock::new(None),
            detached: Mutex::new(Vec::new()),
        }
    }

    /// Attach the workflow read model used by status derivation
    pub fn set_workflow_status(&self, provider: Arc<dyn WorkflowStatusProvider>) {
        *self.workflow_status.write() = Some(provider);
    }

    /// Attach the error-sample writer for boundary failures
    pub fn set_error_samples(&self, writer: Arc<ErrorSampleWriter>) {
        *self.error_samples.write() = Some(writer);
    }

    /// Per-agent last-event store
    pub fn last_events(&self) -> &LastEventStore {
        &self.last_events
    }

    // ------------------------------------------------------------------
    // Deployments & profiles
    // ------------------------------------------------------------------

    /// Create or upsert a deployment. The id is deterministic, so
    /// redeploying the same agent/implementation pair preserves
    /// `createdAt` and (unless overridden) `status`.
    pub fn deploy(&self, request: &DeployRequest, session_id: &str) -> FingerResult<DeploymentRecord> {
        if request.agent_id.trim().is_empty() {
            return Err(FingerError::validation("agentId is required"));
        }
        if session_id.trim().is_empty() {
            return Err(FingerError::validation("sessionId is required"));
        }

        let implementation_id = match &request.implementation_id {
            Some(id) => id.clone(),
            None => self.default_implementation_for(&request.agent_id),
        };
        let module_id = request
            .module_id
            .clone()
            .or_else(|| self.module_for_implementation(&request.agent_id, &implementation_id));

        let id = deployment_id(&request.agent_id, &implementation_id);
        let previous = self.deployments.get(&id).map(|d| d.value().clone());
        let record = DeploymentRecord {
            id: id.clone(),
            agent_id: request.agent_id.clone(),
            implementation_id,
            module_id,
            session_id: session_id.to_string(),
            scope: request.scope,
            // Stored raw; capacity() normalises 0 to 1 at admission.
            // A zero instance count is how logical retirement looks.
            instance_count: request.instance_count,
            launch_mode: request.launch_mode,
            status: request
                .status
                .or(previous.as_ref().map(|p| p.status))
                .unwrap_or(DeploymentStatus::Idle),
            created_at: previous
                .as_ref()
                .map(|p| p.created_at)
                .unwrap_or_else(|| self.clock.now()),
        };
        self.deployments.insert(id.clone(), record.clone());

        if let Some(enabled) = request.enabled {
            let mut profile = self
                .profiles
                .entry(request.agent_id.clone())
                .or_default();
            profile.enabled = enabled;
        }

        info!(
            "deployed agent '{}' as '{}' (instances: {})",
            record.agent_id, record.id, record.instance_count
        );
        self.bus.emit(
            EventKind::AgentRuntimeCatalog,
            Some(session_id.to_string()),
            Some(request.agent_id.clone()),
            json!({ "action": "deploy", "deployment": record }),
        );
        Ok(record)
    }

    /// Replace an agent's runtime profile
    pub fn set_profile(&self, agent_id: &str, mut profile: RuntimeProfile) {
        profile.normalize();
        self.profiles.insert(agent_id.to_string(), profile);
    }

    /// Runtime profile for an agent
    pub fn profile_for(&self, agent_id: &str) -> Option<RuntimeProfile> {
        self.profiles.get(agent_id).map(|p| p.value().clone())
    }

    /// Most recent deployment for an agent
    pub fn latest_deployment(&self, agent_id: &str) -> Option<DeploymentRecord> {
        self.deployments
            .iter()
            .filter(|d| d.value().agent_id == agent_id)
            .map(|d| d.value().clone())
            .max_by_key(|d| d.created_at)
    }

    /// Snapshot of all deployments, sorted by id
    pub fn deployments(&self) -> Vec<DeploymentRecord> {
        let mut all: Vec<DeploymentRecord> =
            self.deployments.iter().map(|d| d.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Agents with a deployment in the given session
    pub fn agents_in_session(&self, session_id: &str) -> Vec<String> {
        let mut agents: Vec<String> = self
            .deployments
            .iter()
            .filter(|d| d.value().session_id == session_id)
            .map(|d| d.value().agent_id.clone())
            .collect();
        agents.sort();
        agents.dedup();
        agents
    }

    /// Quota view for a dispatch against an agent. Quota is surfaced,
    /// never enforced by admission.
    pub fn resolve_quota_view(&self, agent_id: &str, workflow_id: Option<&str>) -> QuotaView {
        let profile = self.profile_for(agent_id);
        let instances = self
            .latest_deployment(agent_id)
            .map(|d| d.capacity())
            .unwrap_or(1);
        resolve_quota(profile.as_ref(), workflow_id, instances)
    }

    /// Definition catalog built from the current inputs
    pub fn definitions(
        &self,
    ) -> std::collections::BTreeMap<String, finger_core::AgentDefinition> {
        build_definitions_with_baseline(
            &self.configs.all(),
            &self.hub.descriptors(),
            &self.deployments(),
        )
    }

    fn default_implementation_for(&self, agent_id: &str) -> String {
        self.definitions()
            .get(agent_id)
            .and_then(|d| {
                d.implementations
                    .iter()
                    .find(|i| i.status == ImplStatus::Available)
                    .or_else(|| d.implementations.first())
                    .map(|i| i.impl_id.clone())
            })
            .unwrap_or_else(|| "native:unbound".to_string())
    }

    fn module_for_implementation(&self, agent_id: &str, implementation_id: &str) -> Option<String> {
        self.definitions().get(agent_id).and_then(|d| {
            d.implementations
                .iter()
                .find(|i| i.impl_id == implementation_id)
                .and_then(|i| i.module_id.clone())
        })
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Dispatch a task to a target agent.
    ///
    /// Blocking callers receive the terminal result; non-blocking
    /// callers receive a queued acknowledgement while the send runs in
    /// the background. Admission-pipeline refusals return a failed
    /// result without side effects.
    pub async fn dispatch(self: &Arc<Self>, request: DispatchRequest) -> DispatchResult {
        let dispatch_id = new_dispatch_id(self.clock.now_millis());

        if request.target_agent_id.trim().is_empty() {
            return DispatchResult::failed(dispatch_id, "targetAgentId is required");
        }
        let deployment = match self.latest_deployment(&request.target_agent_id) {
            Some(deployment) => deployment,
            None => {
                return DispatchResult::failed(
                    dispatch_id,
                    "target agent is not started in resource pool",
                )
            }
        };
        if let Some(profile) = self.profiles.get(&request.target_agent_id) {
            if !profile.enabled {
                return DispatchResult::failed(
                    dispatch_id,
                    "target agent is disabled by orchestration config",
                );
            }
        }
        let target_module_id = deployment
            .module_id
            .clone()
            .unwrap_or_else(|| request.target_agent_id.clone());
        if !self.hub.is_registered(&target_module_id) {
            return DispatchResult::failed(dispatch_id, "target module not found or not started");
        }

        let capacity = deployment.capacity();
        let base_assignment = request
            .assignment
            .clone()
            .unwrap_or_else(|| {
                Assignment::for_dispatch(&request.source_agent_id, &request.target_agent_id)
            });

        let lane = self.lane(&request.target_agent_id);
        let (tx, rx) = oneshot::channel();
        let admission = {
            let mut lane = lane.lock();
            let active = lane.active;
            if request.blocking
                && request.source_agent_id == request.target_agent_id
                && active >= capacity
            {
                Admission::Rejected("dispatch deadlock risk")
            } else if active >= capacity {
                if !request.queue_on_busy {
                    Admission::Rejected("target agent busy")
                } else {
                    let mut item = QueuedItem {
                        dispatch_id: dispatch_id.clone(),
                        request: request.clone(),
                        target_module_id: target_module_id.clone(),
                        assignment: base_assignment.with_phase(AssignmentPhase::Queued),
                        tx: Some(tx),
                        timer: None,
                    };
                    let wait_ms = request.normalized_queue_wait_ms();
                    let scheduler = Arc::clone(self);
                    let agent_id = request.target_agent_id.clone();
                    let timed_out_id = dispatch_id.clone();
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                        scheduler.expire_queued(&agent_id, &timed_out_id);
                    });
                    item.timer = Some(timer.abort_handle());
                    lane.queue.push_back(item);
                    Admission::Queued {
                        position: lane.queue.len(),
                    }
                }
            } else {
                lane.active += 1;
                Admission::Admit
            }
        };

        match admission {
            Admission::Rejected(reason) => {
                debug!(
                    "dispatch {} to '{}' rejected: {}",
                    dispatch_id, request.target_agent_id, reason
                );
                DispatchResult::from_outcome(
                    dispatch_id,
                    Some(target_module_id),
                    DispatchOutcome::Failed {
                        error: reason.to_string(),
                    },
                )
            }
            Admission::Queued { position } => {
                let assignment = base_assignment.with_phase(AssignmentPhase::Queued);
                self.emit_dispatch_event(
                    &dispatch_id,
                    &request,
                    "queued",
                    &assignment,
                    Some(position),
                    None,
                );
                if request.blocking {
                    match rx.await {
                        Ok(result) => result,
                        Err(_) => DispatchResult::failed(dispatch_id, "dispatch resolver dropped"),
                    }
                } else {
                    DispatchResult::from_outcome(
                        dispatch_id,
                        Some(target_module_id),
                        DispatchOutcome::Queued {
                            queue_position: Some(position),
                        },
                    )
                }
            }
            Admission::Admit => {
                drop(rx);
                let assignment = base_assignment.with_phase(AssignmentPhase::Started);
                self.emit_dispatch_event(&dispatch_id, &request, "queued", &assignment, None, None);
                if request.blocking {
                    self.run_admitted(dispatch_id, request, target_module_id, assignment)
                        .await
                } else {
                    let scheduler = Arc::clone(self);
                    let background_id = dispatch_id.clone();
                    let handle = tokio::spawn(async move {
                        let _ = scheduler
                            .run_admitted(background_id, request, target_module_id.clone(), assignment)
                            .await;
                    });
                    self.track_detached(handle);
                    DispatchResult::from_outcome(
                        dispatch_id,
                        None,
                        DispatchOutcome::Queued {
                            queue_position: None,
                        },
                    )
                }
            }
        }
    }

    /// Cancel a queued dispatch before admission; fails the item with
    /// `interrupted by user`. Returns false when the dispatch is no
    /// longer queued.
    pub fn cancel_queued(&self, dispatch_id: &str) -> bool {
        for lane_entry in self.lanes.iter() {
            let lane = lane_entry.value().clone();
            let removed = {
                let mut lane = lane.lock();
                remove_queued(&mut lane.queue, dispatch_id)
            };
            if let Some(mut item) = removed {
                if let Some(timer) = item.timer.take() {
                    timer.abort();
                }
                self.fail_queued_item(item, "interrupted by user");
                return true;
            }
        }
        false
    }

    /// Await all detached background dispatches (shutdown drain)
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.detached.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Current in-flight count for an agent
    pub fn active_count(&self, agent_id: &str) -> u32 {
        self.lanes
            .get(agent_id)
            .map(|l| l.value().lock().active)
            .unwrap_or(0)
    }

    /// Current queue depth for an agent
    pub fn queue_depth(&self, agent_id: &str) -> usize {
        self.lanes
            .get(agent_id)
            .map(|l| l.value().lock().queue.len())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Execution path
    // ------------------------------------------------------------------

    async fn run_admitted(
        self: &Arc<Self>,
        dispatch_id: String,
        request: DispatchRequest,
        target_module_id: String,
        assignment: Assignment,
    ) -> DispatchResult {
        let payload = build_module_payload(&dispatch_id, &request, &assignment);
        let send_result = self.hub.send_to_module(&target_module_id, payload).await;

        let result = match send_result {
            Ok(reply) => {
                let phase = finger_core::terminal_phase_from_review(
                    reply.get("reviewDecision").and_then(|v| v.as_str()),
                );
                let assignment = assignment.with_phase(phase);
                self.emit_dispatch_event(
                    &dispatch_id,
                    &request,
                    "completed",
                    &assignment,
                    None,
                    None,
                );
                DispatchResult::from_outcome(
                    dispatch_id.clone(),
                    Some(target_module_id.clone()),
                    DispatchOutcome::Completed { result: reply },
                )
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    "dispatch {} to module '{}' failed: {}",
                    dispatch_id, target_module_id, message
                );
                if let Some(samples) = self.error_samples.read().as_ref() {
                    samples.write(
                        "scheduler",
                        &message,
                        json!({
                            "dispatchId": dispatch_id,
                            "targetAgentId": request.target_agent_id,
                            "targetModuleId": target_module_id,
                        }),
                    );
                }
                let assignment = assignment.with_phase(AssignmentPhase::Failed);
                self.emit_dispatch_event(
                    &dispatch_id,
                    &request,
                    "failed",
                    &assignment,
                    None,
                    Some(message.clone()),
                );
                DispatchResult::from_outcome(
                    dispatch_id.clone(),
                    Some(target_module_id.clone()),
                    DispatchOutcome::Failed { error: message },
                )
            }
        };

        self.complete_and_drain(&request.target_agent_id);
        result
    }

    /// Decrement the active count and eagerly drain the queue while
    /// capacity allows. Drain is serialised per agent by the lane lock.
    fn complete_and_drain(self: &Arc<Self>, agent_id: &str) {
        let lane = self.lane(agent_id);
        let capacity = self
            .latest_deployment(agent_id)
            .map(|d| d.capacity())
            .unwrap_or(1);

        let mut to_start = Vec::new();
        {
            let mut lane = lane.lock();
            lane.active = lane.active.saturating_sub(1);
            while lane.active < capacity {
                match lane.queue.pop_front() {
                    Some(mut item) => {
                        if let Some(timer) = item.timer.take() {
                            timer.abort();
                        }
                        lane.active += 1;
                        to_start.push(item);
                    }
                    None => break,
                }
            }
        }

        for mut item in to_start {
            let assignment = item.assignment.with_phase(AssignmentPhase::Started);
            self.emit_dispatch_event(
                &item.dispatch_id,
                &item.request,
                "queued",
                &assignment,
                None,
                None,
            );
            let scheduler = Arc::clone(self);
            let tx = item.tx.take();
            let handle = tokio::spawn(async move {
                let result = scheduler
                    .run_admitted(
                        item.dispatch_id,
                        item.request,
                        item.target_module_id,
                        assignment,
                    )
                    .await;
                if let Some(tx) = tx {
                    let _ = tx.send(result);
                }
            });
            self.track_detached(handle);
        }
    }

    /// Queue-timeout eviction; a no-op when the item was already drained
    fn expire_queued(self: &Arc<Self>, agent_id: &str, dispatch_id: &str) {
        let Some(lane) = self.lanes.get(agent_id).map(|l| l.value().clone()) else {
            return;
        };
        let removed = {
            let mut lane = lane.lock();
            remove_queued(&mut lane.queue, dispatch_id)
        };
        if let Some(item) = removed {
            debug!("dispatch {} evicted from queue: timeout", dispatch_id);
            self.fail_queued_item(item, "dispatch queue timeout");
        }
    }

    fn fail_queued_item(&self, mut item: QueuedItem, error: &str) {
        let assignment = item.assignment.with_phase(AssignmentPhase::Failed);
        self.emit_dispatch_event(
            &item.dispatch_id,
            &item.request,
            "failed",
            &assignment,
            None,
            Some(error.to_string()),
        );
        if let Some(tx) = item.tx.take() {
            let _ = tx.send(DispatchResult::from_outcome(
                item.dispatch_id,
                Some(item.target_module_id),
                DispatchOutcome::Failed {
                    error: error.to_string(),
                },
            ));
        }
    }

    fn lane(&self, agent_id: &str) -> Arc<Mutex<Lane>> {
        self.lanes
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Lane::default())))
            .clone()
    }

    fn track_detached(&self, handle: JoinHandle<()>) {
        let mut detached = self.detached.lock();
        detached.retain(|h| !h.is_finished());
        detached.push(handle);
    }

    fn emit_dispatch_event(
        &self,
        dispatch_id: &str,
        request: &DispatchRequest,
        status: &str,
        assignment: &Assignment,
        queue_position: Option<usize>,
        error: Option<String>,
    ) {
        let payload = DispatchEventPayload {
            dispatch_id: dispatch_id.to_string(),
            source_agent_id: request.source_agent_id.clone(),
            target_agent_id: request.target_agent_id.clone(),
            status: status.to_string(),
            assignment: Some(assignment.clone()),
            queue_position,
            workflow_id: request.workflow_id.clone(),
            error,
        };
        let interrupted = status == "failed"
            && payload
                .error
                .as_deref()
                .map(|e| e.contains("interrupt"))
                .unwrap_or(false);
        let last_status = match (status, assignment.phase) {
            ("completed", AssignmentPhase::Passed) => "passed",
            ("completed", AssignmentPhase::Closed) => "closed",
            ("completed", AssignmentPhase::Retry) => "retry",
            ("completed", AssignmentPhase::Reviewing) => "reviewing",
            _ if interrupted => "interrupted",
            (status, _) => status,
        };
        self.last_events.record(
            &request.target_agent_id,
            LastEventKind::Dispatch,
            last_status,
            format!("dispatch {}", status),
            request.session_id.clone(),
            request.workflow_id.clone(),
            Some(dispatch_id.to_string()),
        );
        self.bus.emit(
            EventKind::AgentRuntimeDispatch,
            request.session_id.clone(),
            Some(request.target_agent_id.clone()),
            serde_json::to_value(payload).unwrap_or(Value::Null),
        );
    }

    // ------------------------------------------------------------------
    // Read models
    // ------------------------------------------------------------------

    /// Derived status for one agent, by precedence: error > running >
    /// queued > paused > waiting_input > completed > interrupted > idle.
    pub fn agent_status(&self, agent_id: &str) -> AgentStatus {
        let instances: Vec<DeploymentRecord> = self
            .deployments
            .iter()
            .filter(|d| d.value().agent_id == agent_id)
            .map(|d| d.value().clone())
            .collect();

        if instances
            .iter()
            .any(|d| d.status == DeploymentStatus::Error)
        {
            return AgentStatus::Error;
        }
        let workflow_busy = self
            .workflow_status
            .read()
            .as_ref()
            .map(|p| p.has_in_progress_task_for(agent_id))
            .unwrap_or(false);
        if self.active_count(agent_id) > 0 || workflow_busy {
            return AgentStatus::Running;
        }
        if self.queue_depth(agent_id) > 0 {
            return AgentStatus::Queued;
        }
        if instances
            .iter()
            .any(|d| d.status == DeploymentStatus::Paused)
        {
            return AgentStatus::Paused;
        }
        match self.last_events.get(agent_id) {
            Some(last) if last.status == "waiting_input" => AgentStatus::WaitingInput,
            Some(last) if matches!(last.status.as_str(), "completed" | "passed" | "closed") => {
                AgentStatus::Completed
            }
            Some(last) if matches!(last.status.as_str(), "interrupted" | "cancel") => {
                AgentStatus::Interrupted
            }
            _ => AgentStatus::Idle,
        }
    }

    /// Full runtime view: definitions, instances, profiles, startup
    /// targets and templates
    pub fn runtime_view(&self) -> Value {
        let deployments = self.deployments();
        let modules = self.hub.descriptors();
        let definitions = build_definitions_with_baseline(
            &self.configs.all(),
            &modules,
            &deployments,
        );
        let templates = startup_templates();
        let startup_targets: Vec<Value> = templates
            .iter()
            .map(|t| {
                json!({
                    "agentId": t.agent_id,
                    "moduleId": t.module_id,
                    "registered": modules.iter().any(|m| m.id == t.module_id),
                    "deployed": deployments.iter().any(|d| d.agent_id == t.agent_id),
                })
            })
            .collect();
        let configs: Map<String, Value> = self
            .profiles
            .iter()
            .map(|p| {
                (
                    p.key().clone(),
                    serde_json::to_value(p.value()).unwrap_or(Value::Null),
                )
            })
            .collect();

        json!({
            "definitions": definitions.values().collect::<Vec<_>>(),
            "instances": deployments,
            "configs": configs,
            "startupTargets": startup_targets,
            "startupTemplates": templates,
        })
    }

    /// Catalog at the requested capability layer
    pub fn catalog(&self, layer: CatalogLayer) -> Value {
        let deployments = self.deployments();
        let definitions = build_definitions_with_baseline(
            &self.configs.all(),
            &self.hub.descriptors(),
            &deployments,
        );

        let agents: Vec<Value> = definitions
            .values()
            .map(|definition| {
                let agent_id = definition.id.clone();
                let mut entry = json!({
                    "definition": definition,
                    "status": self.agent_status(&agent_id),
                });
                if matches!(layer, CatalogLayer::Execution | CatalogLayer::Full) {
                    entry["instances"] = json!(deployments
                        .iter()
                        .filter(|d| d.agent_id == agent_id)
                        .collect::<Vec<_>>());
                    entry["activeCount"] = json!(self.active_count(&agent_id));
                    entry["queueDepth"] = json!(self.queue_depth(&agent_id));
                    entry["lastEvent"] = serde_json::to_value(self.last_events.get(&agent_id))
                        .unwrap_or(Value::Null);
                }
                if matches!(layer, CatalogLayer::Governance | CatalogLayer::Full) {
                    entry["profile"] = serde_json::to_value(self.profile_for(&agent_id))
                        .unwrap_or(Value::Null);
                    entry["quota"] = serde_json::to_value(
                        self.resolve_quota_view(&agent_id, None),
                    )
                    .unwrap_or(Value::Null);
                }
                entry
            })
            .collect();

        json!({ "layer": layer, "agents": agents })
    }
}

fn remove_queued(queue: &mut VecDeque<QueuedItem>, dispatch_id: &str) -> Option<QueuedItem> {
    let index = queue.iter().position(|i| i.dispatch_id == dispatch_id)?;
    queue.remove(index)
}

/// Build the payload sent to the target module: object tasks are cloned
/// and their metadata merged with the dispatch envelope; text tasks are
/// wrapped as `{text, sessionId?, metadata}`.
fn build_module_payload(
    dispatch_id: &str,
    request: &DispatchRequest,
    assignment: &Assignment,
) -> Value {
    let mut metadata = Map::new();
    if let TaskPayload::Object(object) = &request.task {
        if let Some(Value::Object(existing)) = object.get("metadata") {
            metadata.extend(existing.clone());
        }
    }
    if let Some(extra) = &request.metadata {
        metadata.extend(extra.clone());
    }
    metadata.insert("dispatchId".to_string(), json!(dispatch_id));
    metadata.insert(
        "sourceAgentId".to_string(),
        json!(request.source_agent_id),
    );
    metadata.insert(
        "targetAgentId".to_string(),
        json!(request.target_agent_id),
    );
    metadata.insert("orchestration".to_string(), json!(true));
    if request.assignment.is_some() || assignment.assignee_agent_id.is_some() {
        metadata.insert(
            "assignment".to_string(),
            serde_json::to_value(assignment).unwrap_or(Value::Null),
        );
    }

    match &request.task {
        TaskPayload::Object(object) => {
            let mut payload = object.clone();
            if let Some(session_id) = &request.session_id {
                payload
                    .entry("sessionId".to_string())
                    .or_insert_with(|| json!(session_id));
            }
            payload.insert("metadata".to_string(), Value::Object(metadata));
            Value::Object(payload)
        }
        TaskPayload::Text(text) => {
            let mut payload = Map::new();
            payload.insert("text".to_string(), json!(text));
            if let Some(session_id) = &request.session_id {
                payload.insert("sessionId".to_string(), json!(session_id));
            }
            payload.insert("metadata".to_string(), Value::Object(metadata));
            Value::Object(payload)
        }
    }
}
