//! Deployment records - running bindings of agents to modules
//!
//! Deployment ids are deterministic so redeploying the same
//! agent/implementation pair is an upsert: `createdAt` and `status`
//! survive unless explicitly overridden.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visibility scope of a deployment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentScope {
    /// Bound to a single session
    Session,
    /// Visible across all sessions
    Global,
}

/// How the deployment was initiated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Started by an operator call
    Manual,
    /// Started by the orchestrator reconciling a profile
    Orchestrator,
}

/// Runtime status of a deployment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Idle,
    Running,
    Error,
    Paused,
}

/// A running binding of an agent to a module with an instance count
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Deterministic id: `deployment-{agentId}-{sanitized(implId)}`
    pub id: String,

    /// Agent the deployment binds
    pub agent_id: String,

    /// Implementation selected for the binding
    pub implementation_id: String,

    /// Backing module, when module-addressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    /// Session the deployment belongs to (non-empty)
    pub session_id: String,

    /// Visibility scope
    pub scope: DeploymentScope,

    /// Concurrent execution slots; normalised to at least 1
    pub instance_count: u32,

    /// How the deployment was started
    pub launch_mode: LaunchMode,

    /// Current status
    pub status: DeploymentStatus,

    /// Creation time; preserved across upserts
    pub created_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Execution capacity: instance count normalised to at least 1
    pub fn capacity(&self) -> u32 {
        self.instance_count.max(1)
    }
}

/// Deterministic deployment id for an agent/implementation pair
pub fn deployment_id(agent_id: &str, impl_id: &str) -> String {
    format!("deployment-{}-{}", agent_id, sanitize_impl_id(impl_id))
}

/// Lowercase the implementation id and map anything outside
/// `[a-z0-9-]` to `-` so the id is path- and wire-safe.
pub fn sanitize_impl_id(impl_id: &str) -> String {
    impl_id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Request to create or upsert a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Agent to deploy
    pub agent_id: String,

    /// Implementation to bind; defaults to the first available one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_id: Option<String>,

    /// Module override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    /// Target session; resolved from the session workspace when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Visibility scope
    #[serde(default = "default_scope")]
    pub scope: DeploymentScope,

    /// Requested instance count (0 is normalised to 1)
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    /// Launch mode
    #[serde(default = "default_launch_mode")]
    pub launch_mode: LaunchMode,

    /// Governance toggle applied to the agent's runtime profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Status override; upserts otherwise preserve the previous status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,
}

fn default_scope() -> DeploymentScope {
    DeploymentScope::Session
}

fn default_instance_count() -> u32 {
    1
}

fn default_launch_mode() -> LaunchMode {
    LaunchMode::Manual
}
