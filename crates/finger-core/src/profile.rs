//! Runtime profiles - per-agent governance knobs
//!
//! A profile is distinct from the definition: it carries the enable
//! switch and the quota policy. Quota is a declared budget surfaced in
//! views; admission only enforces capacity.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Per-agent governance profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeProfile {
    /// Dispatch admission gate; a disabled profile blocks dispatch
    /// regardless of capacity
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Declared capabilities, sorted and unique
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Quota applied when no scoped quota matches
    #[serde(default = "default_quota")]
    pub default_quota: u32,

    /// Scoped quota overrides
    #[serde(default)]
    pub quota_policy: QuotaPolicy,
}

fn default_enabled() -> bool {
    true
}

fn default_quota() -> u32 {
    1
}

impl Default for RuntimeProfile {
    fn default() -> Self {
        Self {
            enabled: true,
            capabilities: Vec::new(),
            default_quota: 1,
            quota_policy: QuotaPolicy::default(),
        }
    }
}

impl RuntimeProfile {
    /// Normalise capabilities to a sorted unique list
    pub fn normalize(&mut self) {
        let caps: BTreeSet<String> = self.capabilities.drain(..).collect();
        self.capabilities = caps.into_iter().collect();
    }
}

/// Scoped quota overrides for a profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaPolicy {
    /// Project-wide quota override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_quota: Option<u32>,

    /// Per-workflow quota overrides
    #[serde(default)]
    pub workflow_quotas: HashMap<String, u32>,
}

/// Which scope supplied the effective quota
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuotaSource {
    Workflow,
    Project,
    Default,
    Deployment,
}

/// The quota resolved for a single dispatch request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaView {
    /// Effective quota value
    pub effective: u32,

    /// Scope that supplied the value
    pub source: QuotaSource,

    /// Matched workflow, when source is `workflow`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// Resolve the quota for an agent by precedence: workflow-match >
/// project > default > fallback to the deployment instance count.
pub fn resolve_quota(
    profile: Option<&RuntimeProfile>,
    workflow_id: Option<&str>,
    deployment_instances: u32,
) -> QuotaView {
    if let Some(profile) = profile {
        if let Some(workflow_id) = workflow_id {
            if let Some(quota) = profile.quota_policy.workflow_quotas.get(workflow_id) {
                return QuotaView {
                    effective: *quota,
                    source: QuotaSource::Workflow,
                    workflow_id: Some(workflow_id.to_string()),
                };
            }
        }
        if let Some(quota) = profile.quota_policy.project_quota {
            return QuotaView {
                effective: quota,
                source: QuotaSource::Project,
                workflow_id: None,
            };
        }
        return QuotaView {
            effective: profile.default_quota,
            source: QuotaSource::Default,
            workflow_id: None,
        };
    }

    QuotaView {
        effective: deployment_instances.max(1),
        source: QuotaSource::Deployment,
        workflow_id: None,
    }
}
