//! Agent registry - builds the catalog from three sources of truth
//!
//! Definitions are derived, never persisted: the merge runs per request
//! over loaded JSON configs, the module registry snapshot, existing
//! deployments, and the baseline startup templates. Given identical
//! inputs the output is identical modulo nothing - maps and lists are
//! kept in sorted order.

use finger_core::{
    associated_agent_ids, is_agent_like, is_ignorable_module, startup_templates, AgentConfigFile,
    AgentDefinition, AgentImplementation, AgentRole, DefinitionSource, DeploymentRecord,
    ImplKind, ImplStatus, ModuleDescriptor, StartupTemplate,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Store of loaded per-agent JSON config files
#[derive(Default)]
pub struct ConfigStore {
    configs: RwLock<Vec<AgentConfigFile>>,
}

impl ConfigStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all loaded configs
    pub fn replace(&self, configs: Vec<AgentConfigFile>) {
        *self.configs.write() = configs;
    }

    /// Add or replace one config by agent id
    pub fn upsert(&self, config: AgentConfigFile) {
        let mut configs = self.configs.write();
        if let Some(existing) = configs.iter_mut().find(|c| c.id == config.id) {
            *existing = config;
        } else {
            configs.push(config);
        }
    }

    /// Config for one agent
    pub fn get(&self, agent_id: &str) -> Option<AgentConfigFile> {
        self.configs.read().iter().find(|c| c.id == agent_id).cloned()
    }

    /// Snapshot of all configs
    pub fn all(&self) -> Vec<AgentConfigFile> {
        self.configs.read().clone()
    }
}

fn role_from_hint(hint: Option<&str>) -> AgentRole {
    match hint.map(|h| h.to_lowercase()) {
        Some(h) if h.contains("orchestr") => AgentRole::Orchestrator,
        Some(h) if h.contains("review") => AgentRole::Reviewer,
        Some(h) if h.contains("search") || h.contains("research") => AgentRole::Searcher,
        _ => AgentRole::Executor,
    }
}

fn apply_config(definitions: &mut BTreeMap<String, AgentDefinition>, config: &AgentConfigFile) {
    let name = config.name.clone().unwrap_or_else(|| config.id.clone());
    let role = config.role.unwrap_or(AgentRole::Executor);
    let definition = definitions
        .entry(config.id.clone())
        .or_insert_with(|| {
            AgentDefinition::new(config.id.clone(), name.clone(), role, DefinitionSource::AgentJson)
        });
    definition.name = name;
    definition.role = role;
    definition.source = DefinitionSource::AgentJson;
    definition.add_tags(config.tags.iter().cloned());

    if let Some(provider) = &config.provider {
        let implementation = if provider.provider_type == "iflow" {
            AgentImplementation {
                impl_id: "iflow".to_string(),
                kind: ImplKind::Iflow,
                module_id: None,
                provider: Some("iflow".to_string()),
                status: ImplStatus::Available,
            }
        } else {
            AgentImplementation {
                impl_id: format!("provider:{}", provider.provider_type),
                kind: ImplKind::Native,
                module_id: None,
                provider: Some(provider.provider_type.clone()),
                status: ImplStatus::Available,
            }
        };
        definition.ensure_implementation(implementation);
    }

    for explicit in config.implementations.iter().filter(|i| i.enabled) {
        definition.ensure_implementation(AgentImplementation {
            impl_id: explicit.id.clone(),
            kind: if explicit.id == "iflow" {
                ImplKind::Iflow
            } else {
                ImplKind::Native
            },
            module_id: explicit.module_id.clone(),
            provider: explicit.provider.clone(),
            status: ImplStatus::Available,
        });
    }
}

fn apply_module(definitions: &mut BTreeMap<String, AgentDefinition>, module: &ModuleDescriptor) {
    if is_ignorable_module(&module.id) || !is_agent_like(module) {
        return;
    }

    for agent_id in associated_agent_ids(&module.id) {
        let definition = definitions.entry(agent_id.clone()).or_insert_with(|| {
            AgentDefinition::new(
                agent_id.clone(),
                agent_id.clone(),
                role_from_hint(module.metadata.role.as_deref()),
                DefinitionSource::Module,
            )
        });
        definition.ensure_implementation(AgentImplementation::native_module(module.id.clone()));
    }
}

fn apply_deployment(
    definitions: &mut BTreeMap<String, AgentDefinition>,
    deployment: &DeploymentRecord,
) {
    let definition = definitions
        .entry(deployment.agent_id.clone())
        .or_insert_with(|| {
            AgentDefinition::new(
                deployment.agent_id.clone(),
                deployment.agent_id.clone(),
                AgentRole::Executor,
                DefinitionSource::Deployment,
            )
        });

    definition.ensure_implementation(AgentImplementation {
        impl_id: deployment.implementation_id.clone(),
        kind: if deployment.implementation_id == "iflow" {
            ImplKind::Iflow
        } else {
            ImplKind::Native
        },
        module_id: deployment.module_id.clone(),
        provider: None,
        status: ImplStatus::Available,
    });
}

fn apply_template(
    definitions: &mut BTreeMap<String, AgentDefinition>,
    template: &StartupTemplate,
    modules: &[ModuleDescriptor],
) {
    let module_registered = modules.iter().any(|m| m.id == template.module_id);
    let definition = definitions
        .entry(template.agent_id.clone())
        .or_insert_with(|| {
            AgentDefinition::new(
                template.agent_id.clone(),
                template.name.clone(),
                template.role,
                DefinitionSource::RuntimeConfig,
            )
        });
    definition.ensure_implementation(AgentImplementation {
        impl_id: format!("native:{}", template.module_id),
        kind: ImplKind::Native,
        module_id: Some(template.module_id.clone()),
        provider: None,
        status: if module_registered {
            ImplStatus::Available
        } else {
            ImplStatus::Unavailable
        },
    });
}

/// Build the definition catalog by merging all sources.
///
/// Precedence when fields collide: loaded configs establish name, role,
/// and provider implementations; modules contribute native
/// implementations; deployments add missing definitions and ensure
/// their implementation exists; baseline templates guarantee the
/// canonical ids are present.
pub fn build_definitions(
    configs: &[AgentConfigFile],
    modules: &[ModuleDescriptor],
    deployments: &[DeploymentRecord],
    templates: &[StartupTemplate],
) -> BTreeMap<String, AgentDefinition> {
    let mut definitions: BTreeMap<String, AgentDefinition> = BTreeMap::new();

    for config in configs {
        apply_config(&mut definitions, config);
    }
    for module in modules {
        apply_module(&mut definitions, module);
    }
    for deployment in deployments {
        apply_deployment(&mut definitions, deployment);
    }
    for template in templates {
        apply_template(&mut definitions, template, modules);
    }

    for definition in definitions.values_mut() {
        definition.finalize();
    }
    definitions
}

/// Build the catalog with the hard-coded baseline templates
pub fn build_definitions_with_baseline(
    configs: &[AgentConfigFile],
    modules: &[ModuleDescriptor],
    deployments: &[DeploymentRecord],
) -> BTreeMap<String, AgentDefinition> {
    build_definitions(configs, modules, deployments, &startup_templates())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use finger_core::{
        deployment_id, DeploymentScope, DeploymentStatus, LaunchMode, ModuleMetadata, ModuleType,
        ProviderSection,
    };

    fn iflow_config(id: &str) -> AgentConfigFile {
        AgentConfigFile {
            id: id.to_string(),
            name: Some(format!("{} agent", id)),
            role: Some(AgentRole::Executor),
            provider: Some(ProviderSection {
                provider_type: "iflow".to_string(),
            }),
            implementations: vec![],
            tools: None,
            tags: vec!["configured".to_string()],
        }
    }

    fn deployment(agent_id: &str, impl_id: &str) -> DeploymentRecord {
        DeploymentRecord {
            id: deployment_id(agent_id, impl_id),
            agent_id: agent_id.to_string(),
            implementation_id: impl_id.to_string(),
            module_id: None,
            session_id: "session-1".to_string(),
            scope: DeploymentScope::Session,
            instance_count: 1,
            launch_mode: LaunchMode::Manual,
            status: DeploymentStatus::Idle,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_config_contributes_iflow_implementation() {
        let definitions =
            build_definitions(&[iflow_config("executor")], &[], &[], &[]);
        let definition = &definitions["executor"];

        assert_eq!(definition.source, DefinitionSource::AgentJson);
        assert!(definition
            .implementations
            .iter()
            .any(|i| i.impl_id == "iflow" && i.kind == ImplKind::Iflow));
        assert!(definition.tags.contains(&"configured".to_string()));
        assert!(definition.tags.contains(&"executor".to_string()));
    }

    #[test]
    fn test_non_iflow_provider_becomes_native() {
        let mut config = iflow_config("coder");
        config.provider = Some(ProviderSection {
            provider_type: "codex".to_string(),
        });
        let definitions = build_definitions(&[config], &[], &[], &[]);
        let definition = &definitions["coder"];

        assert!(definition
            .implementations
            .iter()
            .any(|i| i.impl_id == "provider:codex" && i.kind == ImplKind::Native));
    }

    #[test]
    fn test_module_contributes_native_implementation_with_loop_alias() {
        let module = ModuleDescriptor::agent("executor-loop");
        let definitions = build_definitions(&[], &[module], &[], &[]);

        // Both the raw module id and the de-suffixed agent id exist.
        assert!(definitions.contains_key("executor-loop"));
        let executor = &definitions["executor"];
        assert!(executor
            .implementations
            .iter()
            .any(|i| i.impl_id == "native:executor-loop"
                && i.module_id.as_deref() == Some("executor-loop")
                && i.status == ImplStatus::Available));
    }

    #[test]
    fn test_ignorable_modules_are_skipped() {
        let definitions = build_definitions(
            &[],
            &[
                ModuleDescriptor::agent("mock-executor"),
                ModuleDescriptor::agent("echo-loop"),
                ModuleDescriptor::agent("ws-gateway"),
            ],
            &[],
            &[],
        );
        assert!(definitions.is_empty());
    }

    #[test]
    fn test_non_agent_output_module_is_skipped() {
        let module = ModuleDescriptor {
            id: "render-output".to_string(),
            module_type: ModuleType::Output,
            metadata: ModuleMetadata::default(),
            bridge: None,
            provider: None,
        };
        let definitions = build_definitions(&[], &[module], &[], &[]);
        assert!(definitions.is_empty());
    }

    #[test]
    fn test_deployment_adds_definition_and_implementation() {
        let definitions =
            build_definitions(&[], &[], &[deployment("runner", "iflow")], &[]);
        let definition = &definitions["runner"];

        assert_eq!(definition.source, DefinitionSource::Deployment);
        assert!(definition
            .implementations
            .iter()
            .any(|i| i.impl_id == "iflow" && i.kind == ImplKind::Iflow));
    }

    #[test]
    fn test_templates_guarantee_canonical_ids() {
        let definitions = build_definitions_with_baseline(&[], &[], &[]);

        for id in ["orchestrator", "researcher", "executor", "coder", "reviewer"] {
            let definition = definitions
                .get(id)
                .unwrap_or_else(|| panic!("missing canonical agent {}", id));
            // No module registered, so the template implementation is
            // unavailable and nothing else is derivable.
            assert!(!definition.has_available_implementation());
        }
        assert_eq!(definitions["researcher"].role, AgentRole::Searcher);
        assert_eq!(definitions["coder"].role, AgentRole::Executor);
    }

    #[test]
    fn test_template_availability_follows_module_registration() {
        let definitions = build_definitions_with_baseline(
            &[],
            &[ModuleDescriptor::agent("executor-loop")],
            &[],
        );
        assert!(definitions["executor"].has_available_implementation());
        assert!(!definitions["reviewer"].has_available_implementation());
    }

    #[test]
    fn test_build_is_deterministic() {
        let configs = vec![iflow_config("executor"), iflow_config("reviewer")];
        let modules = vec![
            ModuleDescriptor::agent("reviewer-loop"),
            ModuleDescriptor::agent("executor-loop"),
        ];
        let deployments = vec![deployment("executor", "iflow")];

        let a = build_definitions_with_baseline(&configs, &modules, &deployments);
        let b = build_definitions_with_baseline(&configs, &modules, &deployments);

        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_empty_inputs_yield_template_only_catalog() {
        let definitions = build_definitions(&[], &[], &[], &[]);
        assert!(definitions.is_empty());
    }

    #[test]
    fn test_config_store_upsert() {
        let store = ConfigStore::new();
        store.upsert(iflow_config("executor"));
        store.upsert(iflow_config("executor"));
        assert_eq!(store.all().len(), 1);
        assert!(store.get("executor").is_some());
        assert!(store.get("ghost").is_none());
    }
}
