//! Scheduler integration tests
//!
//! End-to-end scenarios against a runtime with mock kernels: blocking
//! dispatch, queueing, the deadlock guard, queue timeout, control
//! interrupt, and orchestration config reconciliation.

use finger_core::{system_clock, DeployRequest, DispatchRequest, FingerError, FingerResult};
use finger_core::{EventKind, InterruptOutcome, OrchestrationConfig, RuntimeEvent};
use finger_runtime::{
    AgentRunner, AgentRuntime, AgentRuntimeOptions, EventStream, FnModuleHandler,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn runtime() -> (Arc<AgentRuntime>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let runtime = AgentRuntime::new(AgentRuntimeOptions::new(
        dir.path().to_path_buf(),
        system_clock(),
    ));
    (runtime, dir)
}

fn runtime_with_runner(
    runner: Arc<dyn AgentRunner>,
) -> (Arc<AgentRuntime>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut options = AgentRuntimeOptions::new(dir.path().to_path_buf(), system_clock());
    options.runner = runner;
    (AgentRuntime::new(options), dir)
}

fn deploy(runtime: &AgentRuntime, agent_id: &str, instance_count: u32) {
    let request: DeployRequest = serde_json::from_value(json!({
        "agentId": agent_id,
        "implementationId": format!("native:{}-loop", agent_id),
        "instanceCount": instance_count,
    }))
    .unwrap();
    runtime.scheduler.deploy(&request, "session-1").unwrap();
}

fn dispatch_request(source: &str, target: &str, blocking: bool) -> DispatchRequest {
    let mut request = DispatchRequest::text(source, target, "hi");
    request.session_id = Some("session-1".to_string());
    request.blocking = blocking;
    request
}

/// Drain dispatch events for one dispatch id as (status, phase) pairs
async fn dispatch_trail(stream: &mut EventStream, dispatch_id: &str) -> Vec<(String, String)> {
    let mut trail = Vec::new();
    while let Some(event) = next_dispatch_event(stream).await {
        if event.payload["dispatchId"] == dispatch_id {
            trail.push((
                event.payload["status"].as_str().unwrap_or("").to_string(),
                event.payload["assignment"]["phase"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            ));
        }
        if trail
            .last()
            .map(|(status, _)| status == "completed" || status == "failed")
            .unwrap_or(false)
        {
            break;
        }
    }
    trail
}

async fn next_dispatch_event(stream: &mut EventStream) -> Option<RuntimeEvent> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .ok()??;
        if event.kind == EventKind::AgentRuntimeDispatch {
            return Some(event);
        }
    }
}

// ============================================================================
// Scenario 1: happy path, blocking
// ============================================================================

#[tokio::test]
async fn test_blocking_dispatch_happy_path() {
    let (runtime, _dir) = runtime();
    runtime.register_mock_modules(&["executor".to_string(), "orchestrator".to_string()]);
    deploy(&runtime, "executor", 1);
    let mut stream = runtime.bus.subscribe();

    let result = runtime
        .scheduler
        .dispatch(dispatch_request("orchestrator", "executor", true))
        .await;

    assert!(result.ok);
    assert_eq!(serde_json::to_value(result.status).unwrap(), "completed");
    assert_eq!(
        result.result.unwrap()["text"],
        "[mock:executor] hi"
    );

    let trail = dispatch_trail(&mut stream, &result.dispatch_id).await;
    assert_eq!(
        trail,
        vec![
            ("queued".to_string(), "started".to_string()),
            ("completed".to_string(), "closed".to_string()),
        ]
    );
}

// ============================================================================
// Scenario 2: queueing at capacity
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_dispatch_queues_and_drains_in_order() {
    let (runtime, _dir) = runtime();
    runtime.hub.register_module(
        finger_core::ModuleDescriptor::agent("executor-loop"),
        Arc::new(FnModuleHandler(|payload: Value| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!({ "done": payload["metadata"]["dispatchId"] }))
        })),
    );
    deploy(&runtime, "executor", 1);
    let mut stream = runtime.bus.subscribe();

    let scheduler = runtime.scheduler.clone();
    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "executor", true))
                .await
        }
    });
    // Let the first dispatch take the only slot.
    tokio::time::sleep(Duration::from_millis(1)).await;
    let second = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "executor", true))
                .await
        }
    });

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert!(first.ok && second.ok);
    assert_eq!(first.result.unwrap()["done"], first.dispatch_id);
    assert_eq!(second.result.unwrap()["done"], second.dispatch_id);

    // Five dispatch events total: started+completed for the first,
    // queued+started+completed for the second.
    let mut events = Vec::new();
    for _ in 0..5 {
        events.push(next_dispatch_event(&mut stream).await.unwrap());
    }
    let trail_of = |dispatch_id: &str| -> Vec<(String, String)> {
        events
            .iter()
            .filter(|e| e.payload["dispatchId"] == dispatch_id)
            .map(|e| {
                (
                    e.payload["status"].as_str().unwrap_or("").to_string(),
                    e.payload["assignment"]["phase"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                )
            })
            .collect()
    };

    assert_eq!(
        trail_of(&first.dispatch_id),
        vec![
            ("queued".to_string(), "started".to_string()),
            ("completed".to_string(), "closed".to_string()),
        ]
    );
    // The second dispatch queued at position 1, then started on drain.
    let queued_event = events
        .iter()
        .find(|e| e.payload["dispatchId"] == second.dispatch_id)
        .unwrap();
    assert_eq!(queued_event.payload["queuePosition"], 1);
    assert_eq!(
        trail_of(&second.dispatch_id),
        vec![
            ("queued".to_string(), "queued".to_string()),
            ("queued".to_string(), "started".to_string()),
            ("completed".to_string(), "closed".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_active_count_never_exceeds_capacity() {
    let (runtime, _dir) = runtime();
    let concurrent = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    let (c, p) = (concurrent.clone(), peak.clone());
    runtime.hub.register_module(
        finger_core::ModuleDescriptor::agent("executor-loop"),
        Arc::new(FnModuleHandler(move |_payload: Value| {
            let (c, p) = (c.clone(), p.clone());
            async move {
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                c.fetch_sub(1, Ordering::SeqCst);
                Ok(json!({}))
            }
        })),
    );
    deploy(&runtime, "executor", 2);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let scheduler = runtime.scheduler.clone();
        handles.push(tokio::spawn(async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "executor", true))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().ok);
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.scheduler.active_count("executor"), 0);
    assert_eq!(runtime.scheduler.queue_depth("executor"), 0);
}

#[tokio::test]
async fn test_queue_on_busy_false_refuses() {
    let (runtime, _dir) = runtime();
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    runtime.hub.register_module(
        finger_core::ModuleDescriptor::agent("executor-loop"),
        Arc::new(FnModuleHandler(move |_payload: Value| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(json!({}))
            }
        })),
    );
    deploy(&runtime, "executor", 1);

    let scheduler = runtime.scheduler.clone();
    let holder = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "executor", true))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut refused = dispatch_request("orchestrator", "executor", false);
    refused.queue_on_busy = false;
    let result = scheduler.dispatch(refused).await;
    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("target agent busy"));

    release.notify_one();
    assert!(holder.await.unwrap().ok);
}

// ============================================================================
// Scenario 3: deadlock guard
// ============================================================================

#[tokio::test]
async fn test_self_dispatch_at_capacity_is_refused() {
    let (runtime, _dir) = runtime();
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    runtime.hub.register_module(
        finger_core::ModuleDescriptor::agent("orchestrator-loop"),
        Arc::new(FnModuleHandler(move |_payload: Value| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(json!({}))
            }
        })),
    );
    deploy(&runtime, "orchestrator", 1);

    let scheduler = runtime.scheduler.clone();
    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "orchestrator", true))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let result = scheduler
        .dispatch(dispatch_request("orchestrator", "orchestrator", true))
        .await;
    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("dispatch deadlock risk"));
    assert_eq!(runtime.scheduler.queue_depth("orchestrator"), 0);

    release.notify_one();
    assert!(first.await.unwrap().ok);
}

// ============================================================================
// Scenario 4: queue timeout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_queued_dispatch_times_out() {
    let (runtime, _dir) = runtime();
    runtime.hub.register_module(
        finger_core::ModuleDescriptor::agent("executor-loop"),
        Arc::new(FnModuleHandler(|_payload: Value| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        })),
    );
    deploy(&runtime, "executor", 1);
    let mut stream = runtime.bus.subscribe();

    let scheduler = runtime.scheduler.clone();
    let holder = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "executor", true))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let mut waiter = dispatch_request("orchestrator", "executor", true);
    waiter.max_queue_wait_ms = Some(1_000.0);
    let result = scheduler.dispatch(waiter).await;

    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("dispatch queue timeout"));

    let trail = dispatch_trail(&mut stream, &result.dispatch_id).await;
    assert_eq!(
        trail,
        vec![
            ("queued".to_string(), "queued".to_string()),
            ("failed".to_string(), "failed".to_string()),
        ]
    );

    assert!(holder.await.unwrap().ok);
    assert_eq!(runtime.scheduler.queue_depth("executor"), 0);
}

// ============================================================================
// Scenario 5: control interrupt
// ============================================================================

/// Runner whose interrupt aborts the mock kernel's in-flight turn
struct InterruptingRunner {
    abort: Arc<Notify>,
}

#[async_trait]
impl AgentRunner for InterruptingRunner {
    async fn interrupt_session(
        &self,
        session_id: &str,
        _provider_id: Option<&str>,
    ) -> FingerResult<InterruptOutcome> {
        self.abort.notify_waiters();
        Ok(InterruptOutcome {
            interrupted_count: 1,
            sessions: vec![session_id.to_string()],
        })
    }

    async fn session_states(&self) -> FingerResult<Value> {
        Ok(json!([]))
    }
}

#[tokio::test]
async fn test_control_interrupt_fails_in_flight_dispatch() {
    let abort = Arc::new(Notify::new());
    let (runtime, _dir) = runtime_with_runner(Arc::new(InterruptingRunner {
        abort: abort.clone(),
    }));
    runtime.hub.register_module(
        finger_core::ModuleDescriptor::agent("executor-loop"),
        Arc::new(FnModuleHandler(move |_payload: Value| {
            let abort = abort.clone();
            async move {
                abort.notified().await;
                Err(FingerError::transport("turn interrupted by control"))
            }
        })),
    );
    deploy(&runtime, "executor", 1);
    let mut stream = runtime.bus.subscribe();

    let scheduler = runtime.scheduler.clone();
    let in_flight = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "executor", true))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let control = runtime
        .control
        .handle(serde_json::from_value(json!({
            "action": "interrupt",
            "sessionId": "session-1",
        })).unwrap())
        .await;
    assert!(control.ok);
    assert_eq!(control.result.as_ref().unwrap()["interruptedCount"], 1);

    let result = in_flight.await.unwrap();
    assert!(!result.ok);
    assert!(result.error.unwrap().contains("interrupted"));

    // The control event surfaced on the bus and the agent's last event
    // was normalised to interrupted.
    let mut saw_control = false;
    while let Some(event) = stream.try_next() {
        if event.kind == EventKind::AgentRuntimeControl {
            assert_eq!(event.payload["status"], "completed");
            saw_control = true;
        }
    }
    assert!(saw_control);
    let last = runtime.scheduler.last_events().get("executor").unwrap();
    assert_eq!(last.status, "interrupted");
}

// ============================================================================
// Scenario 6: orchestration config reconciliation
// ============================================================================

#[tokio::test]
async fn test_profile_switch_reconciles_agent_set() {
    let (runtime, _dir) = runtime();
    runtime.register_mock_modules(&["all".to_string()]);

    let first: OrchestrationConfig = serde_json::from_value(json!({
        "version": 1,
        "activeProfileId": "main",
        "profiles": [{
            "id": "main",
            "agents": [{"agentId": "executor"}, {"agentId": "reviewer"}]
        }]
    }))
    .unwrap();
    runtime.applier.apply(&first).unwrap();

    let second: OrchestrationConfig = serde_json::from_value(json!({
        "version": 1,
        "activeProfileId": "main",
        "profiles": [{
            "id": "main",
            "agents": [{"agentId": "executor"}, {"agentId": "coder"}]
        }]
    }))
    .unwrap();
    let outcome = runtime.applier.apply(&second).unwrap();

    assert_eq!(outcome.deployed, vec!["executor", "coder"]);
    assert_eq!(outcome.retired, vec!["reviewer"]);

    let mut active: Vec<String> = runtime
        .scheduler
        .deployments()
        .iter()
        .filter(|d| d.instance_count > 0)
        .map(|d| d.agent_id.clone())
        .collect();
    active.sort();
    active.dedup();
    assert_eq!(active, vec!["coder", "executor"]);

    // Retired agent keeps its definition but is blocked from dispatch.
    let result = runtime
        .scheduler
        .dispatch(dispatch_request("orchestrator", "reviewer", true))
        .await;
    assert!(!result.ok);
    assert_eq!(
        result.error.as_deref(),
        Some("target agent is disabled by orchestration config")
    );
    assert!(runtime.scheduler.definitions().contains_key("reviewer"));
}

// ============================================================================
// Admission pipeline refusals
// ============================================================================

#[tokio::test]
async fn test_empty_target_is_rejected_without_side_effects() {
    let (runtime, _dir) = runtime();
    let mut stream = runtime.bus.subscribe();

    let result = runtime
        .scheduler
        .dispatch(dispatch_request("orchestrator", "", true))
        .await;
    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("targetAgentId is required"));
    assert!(stream.try_next().is_none());
}

#[tokio::test]
async fn test_undeployed_target_is_rejected() {
    let (runtime, _dir) = runtime();
    let result = runtime
        .scheduler
        .dispatch(dispatch_request("orchestrator", "executor", true))
        .await;
    assert_eq!(
        result.error.as_deref(),
        Some("target agent is not started in resource pool")
    );
}

#[tokio::test]
async fn test_unregistered_module_is_rejected() {
    let (runtime, _dir) = runtime();
    // Deploy without registering the backing module.
    let request: DeployRequest = serde_json::from_value(json!({
        "agentId": "executor",
        "implementationId": "native:executor-loop",
        "moduleId": "executor-loop",
    }))
    .unwrap();
    runtime.scheduler.deploy(&request, "session-1").unwrap();

    let result = runtime
        .scheduler
        .dispatch(dispatch_request("orchestrator", "executor", true))
        .await;
    assert_eq!(
        result.error.as_deref(),
        Some("target module not found or not started")
    );
}

#[tokio::test]
async fn test_caller_abort_cancels_queued_item() {
    let (runtime, _dir) = runtime();
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    runtime.hub.register_module(
        finger_core::ModuleDescriptor::agent("executor-loop"),
        Arc::new(FnModuleHandler(move |_payload: Value| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(json!({}))
            }
        })),
    );
    deploy(&runtime, "executor", 1);

    let scheduler = runtime.scheduler.clone();
    let holder = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .dispatch(dispatch_request("orchestrator", "executor", true))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Queue a non-blocking dispatch, then cancel it before admission.
    let queued = scheduler
        .dispatch(dispatch_request("orchestrator", "executor", false))
        .await;
    assert_eq!(queued.queue_position, Some(1));
    assert!(scheduler.cancel_queued(&queued.dispatch_id));
    assert_eq!(scheduler.queue_depth("executor"), 0);
    // Cancelling again is a no-op.
    assert!(!scheduler.cancel_queued(&queued.dispatch_id));

    let last = runtime.scheduler.last_events().get("executor").unwrap();
    assert_eq!(last.status, "interrupted");

    release.notify_one();
    assert!(holder.await.unwrap().ok);
}

// ============================================================================
// Non-blocking dispatch
// ============================================================================

#[tokio::test]
async fn test_non_blocking_dispatch_completes_in_background() {
    let (runtime, _dir) = runtime();
    runtime.register_mock_modules(&["executor".to_string()]);
    deploy(&runtime, "executor", 1);
    let mut stream = runtime.bus.subscribe();

    let result = runtime
        .scheduler
        .dispatch(dispatch_request("orchestrator", "executor", false))
        .await;
    assert!(result.ok);
    assert_eq!(serde_json::to_value(result.status).unwrap(), "queued");

    let trail = dispatch_trail(&mut stream, &result.dispatch_id).await;
    assert_eq!(trail.last().unwrap().0, "completed");

    runtime.scheduler.shutdown().await;
}
