//! Orchestration config applier - profile-driven bulk deploy/retire
//!
//! Reconciliation is idempotent: applying the same config twice leaves
//! the same set of active agents. Started agents missing from the
//! active profile are retired logically (redeployed with a zero
//! instance count and a disabled profile); enabled entries deploy into
//! the root session for orchestrator-role agents and a runtime child
//! session for everyone else. The first deploy failure aborts the pass;
//! partial progress stays observable through the emitted events and is
//! not rolled back.

use crate::bus::EventBus;
use crate::scheduler::DispatchScheduler;
use crate::session::SessionWorkspace;
use finger_core::{
    AgentRole, DeployRequest, DeploymentScope, FingerError, FingerResult, OrchestrationConfig,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    /// Profile that was applied
    pub active_profile_id: String,

    /// Agents deployed (or redeployed) by the pass
    pub deployed: Vec<String>,

    /// Agents logically retired by the pass
    pub retired: Vec<String>,
}

/// Applies orchestration config profiles to the runtime
pub struct OrchestrationApplier {
    scheduler: Arc<DispatchScheduler>,
    sessions: Arc<SessionWorkspace>,
    bus: Arc<EventBus>,
    active_review_policy: RwLock<Option<String>>,
}

impl OrchestrationApplier {
    /// Wire the applier to the scheduler and session workspace
    pub fn new(
        scheduler: Arc<DispatchScheduler>,
        sessions: Arc<SessionWorkspace>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            scheduler,
            sessions,
            bus,
            active_review_policy: RwLock::new(None),
        }
    }

    /// Review policy of the profile applied last
    pub fn active_review_policy(&self) -> Option<String> {
        self.active_review_policy.read().clone()
    }

    /// Reconcile the deployed agent set against the config's active profile
    pub fn apply(&self, config: &OrchestrationConfig) -> FingerResult<ApplyOutcome> {
        config.validate()?;
        let profile = config
            .active_profile()
            .ok_or_else(|| FingerError::config("active profile not found"))?;

        info!("applying orchestration profile '{}'", profile.id);
        *self.active_review_policy.write() = profile.review_policy.clone();

        let root = self.sessions.ensure_orchestrator_root_session();
        let definitions = self.scheduler.definitions();

        // Current started set: deployed agents with instances and an
        // enabled (or absent) profile.
        let started: Vec<String> = {
            let mut agents: Vec<String> = self
                .scheduler
                .deployments()
                .iter()
                .filter(|d| d.instance_count > 0)
                .filter(|d| {
                    self.scheduler
                        .profile_for(&d.agent_id)
                        .map(|p| p.enabled)
                        .unwrap_or(true)
                })
                .map(|d| d.agent_id.clone())
                .collect();
            agents.sort();
            agents.dedup();
            agents
        };

        let profile_agent_ids: Vec<&str> = profile
            .agents
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.agent_id.as_str())
            .collect();

        let mut retired = Vec::new();
        for agent_id in &started {
            if profile_agent_ids.contains(&agent_id.as_str()) {
                continue;
            }
            let request = DeployRequest {
                agent_id: agent_id.clone(),
                implementation_id: self
                    .scheduler
                    .latest_deployment(agent_id)
                    .map(|d| d.implementation_id),
                module_id: None,
                session_id: None,
                scope: DeploymentScope::Session,
                instance_count: 0,
                launch_mode: finger_core::LaunchMode::Orchestrator,
                enabled: Some(false),
                status: None,
            };
            let session_id = self
                .scheduler
                .latest_deployment(agent_id)
                .map(|d| d.session_id)
                .unwrap_or_else(|| root.id.clone());
            self.scheduler.deploy(&request, &session_id).map_err(|e| {
                warn!("retiring agent '{}' failed: {}", agent_id, e);
                FingerError::config(format!(
                    "orchestration apply aborted while retiring '{}': {}",
                    agent_id, e
                ))
            })?;
            retired.push(agent_id.clone());
        }

        let mut deployed = Vec::new();
        for entry in profile.agents.iter().filter(|a| a.enabled) {
            let role = definitions
                .get(&entry.agent_id)
                .map(|d| d.role)
                .unwrap_or(AgentRole::Executor);
            let session_id = if role == AgentRole::Orchestrator {
                root.id.clone()
            } else {
                self.sessions
                    .ensure_runtime_child_session(&root, &entry.agent_id)
                    .id
            };
            let request = DeployRequest {
                agent_id: entry.agent_id.clone(),
                implementation_id: entry.target_implementation_id.clone(),
                module_id: None,
                session_id: None,
                scope: DeploymentScope::Session,
                instance_count: entry.instance_count.max(1),
                launch_mode: entry.launch_mode,
                enabled: Some(true),
                status: None,
            };
            self.scheduler.deploy(&request, &session_id).map_err(|e| {
                warn!("deploying agent '{}' failed: {}", entry.agent_id, e);
                FingerError::config(format!(
                    "orchestration apply aborted while deploying '{}': {}",
                    entry.agent_id, e
                ))
            })?;
            deployed.push(entry.agent_id.clone());
        }

        self.sessions.set_current_session(Some(root.id.clone()));
        self.bus.set_default_session(Some(root.id));

        Ok(ApplyOutcome {
            active_profile_id: profile.id.clone(),
            deployed,
            retired,
        })
    }
}

/// Load the orchestration config from `<finger-home>/orchestration.json`
pub fn load_orchestration_config(path: &Path) -> FingerResult<OrchestrationConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        FingerError::config(format!(
            "failed to read orchestration config {}: {}",
            path.display(),
            e
        ))
    })?;
    let config: OrchestrationConfig = serde_json::from_str(&content).map_err(|e| {
        FingerError::config(format!(
            "failed to parse orchestration config {}: {}",
            path.display(),
            e
        ))
    })?;
    config.validate()?;
    Ok(config)
}

/// Persist the orchestration config as whole-file JSON
pub fn save_orchestration_config(path: &Path, config: &OrchestrationConfig) -> FingerResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
