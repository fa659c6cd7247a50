//! Runtime facade - wires the broker's components together
//!
//! The server constructs one `AgentRuntime` and talks to its parts; the
//! facade owns construction order (bus and hub first, scheduler on top,
//! control plane and applier last) and the mock-mode bootstrap that
//! registers echo kernels for the baseline roles.

use crate::applier::OrchestrationApplier;
use crate::bus::EventBus;
use crate::control::ControlPlane;
use crate::error_samples::ErrorSampleWriter;
use crate::hub::{FnModuleHandler, HubConfig, MessageHub};
use crate::input_lock::{InputLockManager, DEFAULT_LOCK_TTL_MS};
use crate::registry::ConfigStore;
use crate::runner::{AgentRunner, NullAgentRunner, NullWorkflowControl, WorkflowControl};
use crate::scheduler::DispatchScheduler;
use crate::session::SessionWorkspace;
use crate::tool_policy::ToolPolicyGate;
use finger_core::{startup_templates, ModuleDescriptor, SharedClock};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Construction options for the runtime
pub struct AgentRuntimeOptions {
    /// Finger home directory for sessions, logs, and config
    pub home: PathBuf,

    /// Wall clock
    pub clock: SharedClock,

    /// Runner collaborator; defaults to the null runner
    pub runner: Arc<dyn AgentRunner>,

    /// Workflow collaborator; defaults to the null engine
    pub workflow: Arc<dyn WorkflowControl>,

    /// Message hub retry configuration
    pub hub_config: HubConfig,

    /// Input lock TTL in milliseconds
    pub lock_ttl_ms: i64,
}

impl AgentRuntimeOptions {
    /// Defaults rooted at the given home directory
    pub fn new(home: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            home: home.into(),
            clock,
            runner: Arc::new(NullAgentRunner),
            workflow: Arc::new(NullWorkflowControl),
            hub_config: HubConfig::default(),
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
        }
    }
}

/// The assembled agent runtime broker
pub struct AgentRuntime {
    pub clock: SharedClock,
    pub bus: Arc<EventBus>,
    pub hub: Arc<MessageHub>,
    pub configs: Arc<ConfigStore>,
    pub scheduler: Arc<DispatchScheduler>,
    pub control: Arc<ControlPlane>,
    pub tool_gate: Arc<ToolPolicyGate>,
    pub input_locks: Arc<InputLockManager>,
    pub sessions: Arc<SessionWorkspace>,
    pub applier: Arc<OrchestrationApplier>,
    pub error_samples: Arc<ErrorSampleWriter>,
}

impl AgentRuntime {
    /// Assemble the runtime from options
    pub fn new(options: AgentRuntimeOptions) -> Arc<Self> {
        let clock = options.clock;
        let bus = Arc::new(EventBus::new(clock.clone()));
        let hub = Arc::new(MessageHub::new(options.hub_config));
        let configs = Arc::new(ConfigStore::new());
        let scheduler = Arc::new(DispatchScheduler::new(
            clock.clone(),
            bus.clone(),
            hub.clone(),
            configs.clone(),
        ));
        let control = Arc::new(ControlPlane::new(
            scheduler.clone(),
            options.runner,
            options.workflow,
            bus.clone(),
        ));
        let tool_gate = Arc::new(ToolPolicyGate::new(configs.clone()));
        let input_locks = Arc::new(InputLockManager::new(
            clock.clone(),
            bus.clone(),
            options.lock_ttl_ms,
        ));
        let sessions = Arc::new(SessionWorkspace::new(options.home.clone(), clock.clone()));
        let applier = Arc::new(OrchestrationApplier::new(
            scheduler.clone(),
            sessions.clone(),
            bus.clone(),
        ));
        let error_samples = Arc::new(ErrorSampleWriter::new(options.home, clock.clone()));
        scheduler.set_error_samples(error_samples.clone());

        Arc::new(Self {
            clock,
            bus,
            hub,
            configs,
            scheduler,
            control,
            tool_gate,
            input_locks,
            sessions,
            applier,
            error_samples,
        })
    }

    /// Register echo kernels for the given baseline roles so the broker
    /// runs without provider kernels attached. The modules keep their
    /// real ids (`<agentId>-loop`); only the handler is a stand-in.
    pub fn register_mock_modules(&self, roles: &[String]) {
        for template in startup_templates() {
            let all = roles.iter().any(|r| r == "all");
            if !all && !roles.iter().any(|r| r == &template.agent_id) {
                continue;
            }
            let agent_id = template.agent_id.clone();
            info!("registering mock kernel for '{}'", agent_id);
            self.hub.register_module(
                ModuleDescriptor::agent(template.module_id),
                Arc::new(FnModuleHandler(move |payload: Value| {
                    let agent_id = agent_id.clone();
                    async move {
                        Ok(json!({
                            "agentId": agent_id,
                            "text": format!(
                                "[mock:{}] {}",
                                agent_id,
                                payload.get("text").and_then(|t| t.as_str()).unwrap_or("")
                            ),
                            "echo": payload,
                        }))
                    }
                })),
            );
        }
    }
}

/// Mock roles selected by `FINGER_FULL_MOCK_MODE` and the per-role
/// `FINGER_MOCK_<ROLE>` toggles
pub fn mock_roles_from_env() -> Vec<String> {
    fn truthy(value: &str) -> bool {
        matches!(value, "1" | "true" | "yes" | "on")
    }
    if std::env::var("FINGER_FULL_MOCK_MODE")
        .map(|v| truthy(&v.to_lowercase()))
        .unwrap_or(false)
    {
        return vec!["all".to_string()];
    }
    startup_templates()
        .iter()
        .filter(|t| {
            std::env::var(format!("FINGER_MOCK_{}", t.agent_id.to_uppercase()))
                .map(|v| truthy(&v.to_lowercase()))
                .unwrap_or(false)
        })
        .map(|t| t.agent_id.clone())
        .collect()
}
