//! Loaded configuration shapes
//!
//! Two families live here: per-agent JSON config files (provider,
//! explicit implementations, tool authorization) and the orchestration
//! config that drives profile-based bulk deploy/retire. Both are
//! whole-file JSON with an embedded format version.

use crate::agent::AgentRole;
use crate::deployment::LaunchMode;
use crate::error::{FingerError, FingerResult};
use serde::{Deserialize, Serialize};

/// Current orchestration config format version
pub const ORCHESTRATION_CONFIG_VERSION: u32 = 1;

/// A loaded per-agent JSON config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfigFile {
    /// Agent id the file configures
    pub id: String,

    /// Display name; falls back to the id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Declared role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,

    /// Provider declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderSection>,

    /// Explicit implementations
    #[serde(default)]
    pub implementations: Vec<ExplicitImplementation>,

    /// Tool policy section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsSection>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Provider declaration inside an agent config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSection {
    /// Provider type (e.g. "iflow", "codex")
    #[serde(rename = "type")]
    pub provider_type: String,
}

/// Explicitly declared implementation inside an agent config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplicitImplementation {
    /// Implementation id
    pub id: String,

    /// Disabled entries are skipped by the registry merge
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backing module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    /// Provider name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Tool policy section of an agent config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsSection {
    /// Whether tool invocations require interactive authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_required: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Profile-driven orchestration config (`<finger-home>/orchestration.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationConfig {
    /// Embedded format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Available profiles
    pub profiles: Vec<OrchestrationProfile>,

    /// Profile selected for reconciliation
    pub active_profile_id: String,
}

fn default_version() -> u32 {
    ORCHESTRATION_CONFIG_VERSION
}

impl OrchestrationConfig {
    /// Active profile lookup
    pub fn active_profile(&self) -> Option<&OrchestrationProfile> {
        self.profiles.iter().find(|p| p.id == self.active_profile_id)
    }

    /// Validate structural invariants; an invalid config at startup is fatal
    pub fn validate(&self) -> FingerResult<()> {
        if self.profiles.is_empty() {
            return Err(FingerError::config("orchestration config has no profiles"));
        }
        if self.active_profile().is_none() {
            return Err(FingerError::config(format!(
                "active profile '{}' not found in orchestration config",
                self.active_profile_id
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for profile in &self.profiles {
            if profile.id.is_empty() {
                return Err(FingerError::config("profile id must be non-empty"));
            }
            if !seen.insert(&profile.id) {
                return Err(FingerError::config(format!(
                    "duplicate profile id '{}'",
                    profile.id
                )));
            }
            for agent in &profile.agents {
                if agent.agent_id.is_empty() {
                    return Err(FingerError::config(format!(
                        "profile '{}' contains an agent entry without an agentId",
                        profile.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One deployable profile inside the orchestration config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationProfile {
    /// Profile id
    pub id: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Review policy applied while the profile is active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_policy: Option<String>,

    /// Agents the profile deploys
    #[serde(default)]
    pub agents: Vec<ProfileAgent>,
}

/// Agent entry inside an orchestration profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAgent {
    /// Agent to deploy
    pub agent_id: String,

    /// Whether the entry deploys (false retires logically)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Instance count for the deployment
    #[serde(default = "default_instances")]
    pub instance_count: u32,

    /// Launch mode for the deployment
    #[serde(default = "default_profile_launch_mode")]
    pub launch_mode: LaunchMode,

    /// Pinned implementation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_implementation_id: Option<String>,
}

fn default_instances() -> u32 {
    1
}

fn default_profile_launch_mode() -> LaunchMode {
    LaunchMode::Orchestrator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> OrchestrationConfig {
        serde_json::from_str(
            r#"{
                "version": 1,
                "activeProfileId": "default",
                "profiles": [
                    {
                        "id": "default",
                        "reviewPolicy": "strict",
                        "agents": [
                            {"agentId": "orchestrator"},
                            {"agentId": "executor", "instanceCount": 2}
                        ]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = sample_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.active_profile().unwrap().id, "default");
    }

    #[test]
    fn test_missing_active_profile_fails() {
        let mut config = sample_config();
        config.active_profile_id = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_profile_ids_fail() {
        let mut config = sample_config();
        config.profiles.push(config.profiles[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_agent_defaults() {
        let config = sample_config();
        let agents = &config.active_profile().unwrap().agents;
        assert!(agents[0].enabled);
        assert_eq!(agents[0].instance_count, 1);
        assert_eq!(agents[0].launch_mode, LaunchMode::Orchestrator);
        assert_eq!(agents[1].instance_count, 2);
    }

    #[test]
    fn test_agent_config_file_parses_tools_section() {
        let config: AgentConfigFile = serde_json::from_str(
            r#"{
                "id": "executor",
                "provider": {"type": "iflow"},
                "tools": {"authorizationRequired": true}
            }"#,
        )
        .unwrap();
        assert_eq!(config.provider.unwrap().provider_type, "iflow");
        assert_eq!(config.tools.unwrap().authorization_required, Some(true));
    }
}
