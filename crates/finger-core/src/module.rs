//! Module descriptors and the agent-identity heuristic
//!
//! Modules are the addressable endpoints of the message hub. The
//! registry only treats a subset of them as agents; that decision is a
//! pure predicate here so each branch stays unit-testable.

use serde::{Deserialize, Serialize};

/// Gateway module ids that never count as agents
pub const GATEWAY_MODULE_IDS: &[&str] = &["ws-gateway", "http-gateway", "session-gateway"];

/// Kind of a registered module
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// First-class agent module
    Agent,
    /// Output/bridge module; may still host an agent loop
    Output,
    /// Infrastructure module (gateway, store, transport)
    Service,
}

/// Free-form metadata a module registers with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    /// Declared module type hint (e.g. "agent-loop")
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub type_hint: Option<String>,

    /// Declared role hint (e.g. "orchestrator")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Descriptor for a module registered with the message hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Unique module id
    pub id: String,

    /// Module kind
    pub module_type: ModuleType,

    /// Registration metadata
    #[serde(default)]
    pub metadata: ModuleMetadata,

    /// Bridge identifier, when the module fronts an external kernel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,

    /// Provider name, when provider-backed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ModuleDescriptor {
    /// Plain agent module with no extra hints
    pub fn agent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            module_type: ModuleType::Agent,
            metadata: ModuleMetadata::default(),
            bridge: None,
            provider: None,
        }
    }
}

/// Whether the module must be skipped by the registry merge entirely.
pub fn is_ignorable_module(module_id: &str) -> bool {
    let id = module_id.to_lowercase();
    id.contains("mock")
        || id.contains("echo")
        || id.contains("debug-agent")
        || GATEWAY_MODULE_IDS.contains(&id.as_str())
}

fn hints_agent_identity(hint: &str) -> bool {
    let hint = hint.to_lowercase();
    hint.contains("loop")
        || hint.contains("orchestr")
        || hint.contains("executor")
        || hint.contains("review")
}

/// Agent-identity heuristic: true for agent modules, and for output
/// modules whose metadata, bridge, or provider marks them as hosting an
/// agent loop.
pub fn is_agent_like(module: &ModuleDescriptor) -> bool {
    match module.module_type {
        ModuleType::Agent => true,
        ModuleType::Output => {
            let metadata_hints = module
                .metadata
                .type_hint
                .as_deref()
                .map(hints_agent_identity)
                .unwrap_or(false)
                || module
                    .metadata
                    .role
                    .as_deref()
                    .map(hints_agent_identity)
                    .unwrap_or(false);

            let bridge_hints = module
                .bridge
                .as_deref()
                .map(|b| b.to_lowercase().contains("rust-kernel"))
                .unwrap_or(false);

            let codex_hints = module.provider.as_deref() == Some("codex") && {
                let id = module.id.to_lowercase();
                id.contains("finger") || id.contains("chat-codex")
            };

            metadata_hints || bridge_hints || codex_hints
        }
        ModuleType::Service => false,
    }
}

/// Agent id a module contributes implementations for. Modules whose id
/// ends in `-loop` are associated with the de-suffixed agent id too.
pub fn associated_agent_ids(module_id: &str) -> Vec<String> {
    let mut ids = vec![module_id.to_string()];
    if let Some(stripped) = module_id.strip_suffix("-loop") {
        if !stripped.is_empty() {
            ids.push(stripped.to_string());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_module(id: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            id: id.to_string(),
            module_type: ModuleType::Output,
            metadata: ModuleMetadata::default(),
            bridge: None,
            provider: None,
        }
    }

    #[test]
    fn test_agent_type_is_always_agent_like() {
        assert!(is_agent_like(&ModuleDescriptor::agent("executor-loop")));
    }

    #[test]
    fn test_output_with_loop_type_hint() {
        let mut module = output_module("some-output");
        module.metadata.type_hint = Some("agent-loop".to_string());
        assert!(is_agent_like(&module));
    }

    #[test]
    fn test_output_with_role_hint() {
        let mut module = output_module("some-output");
        module.metadata.role = Some("orchestrator".to_string());
        assert!(is_agent_like(&module));

        module.metadata.role = Some("reviewer".to_string());
        assert!(is_agent_like(&module));
    }

    #[test]
    fn test_output_with_rust_kernel_bridge() {
        let mut module = output_module("bridge-output");
        module.bridge = Some("rust-kernel-v2".to_string());
        assert!(is_agent_like(&module));
    }

    #[test]
    fn test_output_with_codex_provider_and_id_hint() {
        let mut module = output_module("chat-codex-main");
        module.provider = Some("codex".to_string());
        assert!(is_agent_like(&module));

        let mut module = output_module("finger-codex");
        module.provider = Some("codex".to_string());
        assert!(is_agent_like(&module));

        // codex provider alone is not enough
        let mut module = output_module("unrelated");
        module.provider = Some("codex".to_string());
        assert!(!is_agent_like(&module));
    }

    #[test]
    fn test_plain_output_and_service_are_not_agents() {
        assert!(!is_agent_like(&output_module("render-output")));

        let service = ModuleDescriptor {
            id: "session-store".to_string(),
            module_type: ModuleType::Service,
            metadata: ModuleMetadata::default(),
            bridge: None,
            provider: None,
        };
        assert!(!is_agent_like(&service));
    }

    #[test]
    fn test_ignorable_modules() {
        assert!(is_ignorable_module("mock-executor"));
        assert!(is_ignorable_module("echo-loop"));
        assert!(is_ignorable_module("debug-agent-1"));
        assert!(is_ignorable_module("ws-gateway"));
        assert!(!is_ignorable_module("executor-loop"));
    }

    #[test]
    fn test_loop_suffix_association() {
        assert_eq!(
            associated_agent_ids("executor-loop"),
            vec!["executor-loop", "executor"]
        );
        assert_eq!(associated_agent_ids("executor"), vec!["executor"]);
        assert_eq!(associated_agent_ids("-loop"), vec!["-loop"]);
    }
}
