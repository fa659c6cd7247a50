// Finger Runtime - the agent runtime broker core
//
// Event bus, message hub, agent registry, dispatch scheduler, control
// plane, tool policy gate, input lock manager, session workspace, and
// the orchestration config applier. The HTTP/WebSocket surface lives in
// finger-server; provider kernels and the workflow engine are consumed
// through the traits in `runner`.

pub mod applier;
pub mod bus;
pub mod control;
pub mod error_samples;
pub mod hub;
pub mod input_lock;
pub mod last_event;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod tool_policy;

pub use applier::{
    load_orchestration_config, save_orchestration_config, ApplyOutcome, OrchestrationApplier,
};
pub use bus::{EventBus, EventStream};
pub use control::ControlPlane;
pub use error_samples::{ErrorSampleWriter, ERROR_SAMPLE_VERSION};
pub use hub::{
    backoff_delay_ms, is_retryable_error, FnModuleHandler, HubConfig, MessageHub, ModuleHandler,
    Route, DEFAULT_BLOCKING_TIMEOUT_MS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_MS,
    MAX_BACKOFF_MS,
};
pub use input_lock::{
    AcquireOutcome, HeartbeatOutcome, InputLockManager, InputLockState, DEFAULT_LOCK_TTL_MS,
};
pub use last_event::LastEventStore;
pub use registry::{build_definitions, build_definitions_with_baseline, ConfigStore};
pub use runner::{
    AgentRunner, NullAgentRunner, NullWorkflowControl, WorkflowControl, WorkflowStatusProvider,
};
pub use runtime::{mock_roles_from_env, AgentRuntime, AgentRuntimeOptions};
pub use scheduler::{AgentStatus, CatalogLayer, DispatchScheduler};
pub use session::{SessionKind, SessionRecord, SessionWorkspace};
pub use tool_policy::{
    AgentToolPolicy, ToolAccess, ToolEntry, ToolPolicy, ToolPolicyGate,
};
