//! Tool policy gate - per-agent whitelist/blacklist composition
//!
//! The gate composes per-agent lists against the global tool registry:
//! exposed tools are the whitelist when one is set, otherwise the
//! globally allowed tools, always minus the blacklist. Output lists are
//! case-insensitively sorted and deduplicated. List mutation replaces
//! the whole list; readers always observe a consistent snapshot.

use crate::registry::ConfigStore;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Global policy of a registered tool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolPolicy {
    Allow,
    Deny,
}

/// A tool registered with the global registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEntry {
    /// Tool name, the dispatch key
    pub name: String,

    /// Global policy
    pub policy: ToolPolicy,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-agent whitelist/blacklist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentToolPolicy {
    /// When non-empty, replaces the global allow set
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Always subtracted from the exposed set
    #[serde(default)]
    pub blacklist: Vec<String>,
}

/// Composed tool access for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAccess {
    /// Tools the agent may invoke
    pub exposed_tools: Vec<String>,

    /// Active whitelist
    pub whitelist: Vec<String>,

    /// Active blacklist
    pub blacklist: Vec<String>,

    /// From the agent config's `tools.authorizationRequired`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_required: Option<bool>,
}

fn sorted_unique(names: impl IntoIterator<Item = String>) -> Vec<String> {
    // Case-insensitive ordering with a stable tiebreak on the raw name;
    // duplicates compare equal case-insensitively and collapse.
    let mut map: BTreeMap<(String, String), String> = BTreeMap::new();
    for name in names {
        map.insert((name.to_lowercase(), name.clone()), name);
    }
    let mut seen = std::collections::HashSet::new();
    map.into_values()
        .filter(|n| seen.insert(n.to_lowercase()))
        .collect()
}

/// Global tool registry plus per-agent policies
pub struct ToolPolicyGate {
    tools: DashMap<String, ToolEntry>,
    agent_policies: DashMap<String, AgentToolPolicy>,
    configs: Arc<ConfigStore>,
}

impl ToolPolicyGate {
    /// Gate reading `authorizationRequired` from the given config store
    pub fn new(configs: Arc<ConfigStore>) -> Self {
        Self {
            tools: DashMap::new(),
            agent_policies: DashMap::new(),
            configs,
        }
    }

    /// Register (or replace) a tool in the global registry
    pub fn register_tool(&self, entry: ToolEntry) {
        self.tools.insert(entry.name.clone(), entry);
    }

    /// Snapshot of the global registry, sorted by name
    pub fn tools(&self) -> Vec<ToolEntry> {
        let mut all: Vec<ToolEntry> = self.tools.iter().map(|t| t.value().clone()).collect();
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }

    /// Atomically replace an agent's whitelist
    pub fn set_agent_tool_whitelist(&self, agent_id: &str, whitelist: Vec<String>) {
        let mut policy = self.agent_policies.entry(agent_id.to_string()).or_default();
        policy.whitelist = sorted_unique(whitelist);
    }

    /// Atomically replace an agent's blacklist
    pub fn set_agent_tool_blacklist(&self, agent_id: &str, blacklist: Vec<String>) {
        let mut policy = self.agent_policies.entry(agent_id.to_string()).or_default();
        policy.blacklist = sorted_unique(blacklist);
    }

    /// Per-agent policy snapshot
    pub fn agent_policy(&self, agent_id: &str) -> AgentToolPolicy {
        self.agent_policies
            .get(agent_id)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    /// Compose the set of tool names the agent may invoke
    pub fn resolve_tool_access(&self, agent_id: &str) -> ToolAccess {
        let global_allowed: Vec<String> = self
            .tools
            .iter()
            .filter(|t| t.value().policy == ToolPolicy::Allow)
            .map(|t| t.value().name.clone())
            .collect();

        let policy = self.agent_policy(agent_id);
        let base = if policy.whitelist.is_empty() {
            global_allowed
        } else {
            policy.whitelist.clone()
        };
        let blacklist: std::collections::HashSet<String> =
            policy.blacklist.iter().map(|n| n.to_lowercase()).collect();
        let exposed = base
            .into_iter()
            .filter(|n| !blacklist.contains(&n.to_lowercase()));

        let authorization_required = self
            .configs
            .get(agent_id)
            .and_then(|c| c.tools)
            .and_then(|t| t.authorization_required);

        ToolAccess {
            exposed_tools: sorted_unique(exposed),
            whitelist: policy.whitelist,
            blacklist: policy.blacklist,
            authorization_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finger_core::AgentConfigFile;

    fn gate() -> ToolPolicyGate {
        let gate = ToolPolicyGate::new(Arc::new(ConfigStore::new()));
        for (name, policy) in [
            ("shell", ToolPolicy::Allow),
            ("web-search", ToolPolicy::Allow),
            ("file-read", ToolPolicy::Allow),
            ("raw-socket", ToolPolicy::Deny),
        ] {
            gate.register_tool(ToolEntry {
                name: name.to_string(),
                policy,
                description: None,
            });
        }
        gate
    }

    #[test]
    fn test_global_allowed_without_policy() {
        let gate = gate();
        let access = gate.resolve_tool_access("executor");
        assert_eq!(access.exposed_tools, vec!["file-read", "shell", "web-search"]);
        assert!(access.whitelist.is_empty());
    }

    #[test]
    fn test_whitelist_replaces_global_set() {
        let gate = gate();
        gate.set_agent_tool_whitelist("executor", vec!["shell".to_string()]);
        let access = gate.resolve_tool_access("executor");
        assert_eq!(access.exposed_tools, vec!["shell"]);
    }

    #[test]
    fn test_blacklist_always_subtracts() {
        let gate = gate();
        gate.set_agent_tool_blacklist("executor", vec!["shell".to_string()]);
        let access = gate.resolve_tool_access("executor");
        assert_eq!(access.exposed_tools, vec!["file-read", "web-search"]);

        gate.set_agent_tool_whitelist("executor", vec!["shell".to_string(), "web-search".to_string()]);
        let access = gate.resolve_tool_access("executor");
        assert_eq!(access.exposed_tools, vec!["web-search"]);
    }

    #[test]
    fn test_exposed_is_subset_and_disjoint() {
        let gate = gate();
        gate.set_agent_tool_whitelist(
            "executor",
            vec!["shell".to_string(), "custom-tool".to_string()],
        );
        gate.set_agent_tool_blacklist("executor", vec!["custom-tool".to_string()]);
        let access = gate.resolve_tool_access("executor");

        for tool in &access.exposed_tools {
            assert!(access.whitelist.contains(tool));
            assert!(!access.blacklist.contains(tool));
        }
    }

    #[test]
    fn test_lists_sorted_case_insensitively_and_deduped() {
        let gate = gate();
        gate.set_agent_tool_whitelist(
            "executor",
            vec![
                "Zeta".to_string(),
                "alpha".to_string(),
                "ALPHA".to_string(),
                "beta".to_string(),
            ],
        );
        let access = gate.resolve_tool_access("executor");
        assert_eq!(access.whitelist.len(), 3);
        assert_eq!(access.whitelist[0].to_lowercase(), "alpha");
        assert_eq!(access.whitelist[2].to_lowercase(), "zeta");
    }

    #[test]
    fn test_authorization_required_from_config() {
        let configs = Arc::new(ConfigStore::new());
        configs.upsert(
            serde_json::from_value::<AgentConfigFile>(serde_json::json!({
                "id": "executor",
                "tools": {"authorizationRequired": true}
            }))
            .unwrap(),
        );
        let gate = ToolPolicyGate::new(configs);
        let access = gate.resolve_tool_access("executor");
        assert_eq!(access.authorization_required, Some(true));

        let access = gate.resolve_tool_access("unconfigured");
        assert_eq!(access.authorization_required, None);
    }
}
