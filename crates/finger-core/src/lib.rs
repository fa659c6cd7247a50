// Finger Core - Foundation types and traits for the agent runtime broker
//
// This crate holds the data model shared by the runtime and the server:
// agent definitions, deployments, profiles, assignments, dispatch and
// control contracts, events, module descriptors, and configuration.

pub mod agent;
pub mod assignment;
pub mod clock;
pub mod config;
pub mod control;
pub mod deployment;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod module;
pub mod profile;

pub use agent::{
    startup_templates, AgentDefinition, AgentImplementation, AgentRole, DefinitionSource,
    ImplKind, ImplStatus, StartupTemplate,
};
pub use assignment::{terminal_phase_from_review, Assignment, AssignmentPhase};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AgentConfigFile, ExplicitImplementation, OrchestrationConfig, OrchestrationProfile,
    ProfileAgent, ProviderSection, ToolsSection, ORCHESTRATION_CONFIG_VERSION,
};
pub use control::{
    ControlAction, ControlRequest, ControlResult, ControlStatus, InterruptOutcome,
};
pub use deployment::{
    deployment_id, sanitize_impl_id, DeployRequest, DeploymentRecord, DeploymentScope,
    DeploymentStatus, LaunchMode,
};
pub use dispatch::{
    new_dispatch_id, DispatchOutcome, DispatchRequest, DispatchResult, DispatchStatus,
    TaskPayload, DEFAULT_MAX_QUEUE_WAIT_MS, MIN_QUEUE_WAIT_MS,
};
pub use error::{FingerError, FingerResult};
pub use event::{
    AgentLastEvent, ControlEventPayload, DispatchEventPayload, EventKind, LastEventKind,
    RuntimeEvent, DEFAULT_SESSION_ID,
};
pub use module::{
    associated_agent_ids, is_agent_like, is_ignorable_module, ModuleDescriptor, ModuleMetadata,
    ModuleType, GATEWAY_MODULE_IDS,
};
pub use profile::{resolve_quota, QuotaPolicy, QuotaSource, QuotaView, RuntimeProfile};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
