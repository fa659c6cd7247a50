//! Agent definitions - the logical identity of an agent
//!
//! A definition is derived, never persisted: the registry reconstructs
//! it per request by merging loaded JSON configs, registered modules,
//! existing deployments, and the baseline startup templates. Given
//! identical inputs the merge is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role an agent plays in the fleet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Executes delegated work
    Executor,
    /// Reviews the output of other agents
    Reviewer,
    /// Coordinates sub-agent task fan-out
    Orchestrator,
    /// Research / retrieval worker
    Searcher,
}

impl AgentRole {
    /// Role label used in definition tags
    pub fn label(&self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Reviewer => "reviewer",
            Self::Orchestrator => "orchestrator",
            Self::Searcher => "searcher",
        }
    }
}

/// Where a definition was first established during the catalog merge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DefinitionSource {
    /// Loaded JSON agent config file
    AgentJson,
    /// Runtime orchestration config entry
    RuntimeConfig,
    /// Registered module
    Module,
    /// Existing deployment record
    Deployment,
}

/// Kind of an agent implementation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImplKind {
    /// Backed by the iflow provider bridge
    Iflow,
    /// Backed by an in-process module
    Native,
}

/// Availability of an implementation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImplStatus {
    Available,
    Unavailable,
}

/// One concrete way to run an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentImplementation {
    /// Implementation id, unique within the definition
    pub impl_id: String,

    /// Implementation kind
    pub kind: ImplKind,

    /// Backing module, when the implementation is module-addressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    /// Provider name for provider-backed implementations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Whether the implementation can currently be dispatched to
    pub status: ImplStatus,
}

impl AgentImplementation {
    /// Native implementation backed by a registered module
    pub fn native_module(module_id: impl Into<String>) -> Self {
        let module_id = module_id.into();
        Self {
            impl_id: format!("native:{}", module_id),
            kind: ImplKind::Native,
            module_id: Some(module_id),
            provider: None,
            status: ImplStatus::Available,
        }
    }

    /// Synthetic placeholder appended when no implementation is derivable
    pub fn unbound() -> Self {
        Self {
            impl_id: "native:unbound".to_string(),
            kind: ImplKind::Native,
            module_id: None,
            provider: None,
            status: ImplStatus::Unavailable,
        }
    }
}

/// The logical identity of an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    /// Unique, non-empty agent id
    pub id: String,

    /// Display name
    pub name: String,

    /// Role in the fleet
    pub role: AgentRole,

    /// Provenance of the definition
    pub source: DefinitionSource,

    /// Ordered implementations, sorted by id for deterministic output
    pub implementations: Vec<AgentImplementation>,

    /// Sorted tag set; always contains the role label
    pub tags: Vec<String>,
}

impl AgentDefinition {
    /// Create a definition with the role label pre-seeded into tags
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: AgentRole,
        source: DefinitionSource,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            source,
            implementations: Vec::new(),
            tags: vec![role.label().to_string()],
        }
    }

    /// Add an implementation unless one with the same id already exists
    pub fn ensure_implementation(&mut self, implementation: AgentImplementation) {
        if !self
            .implementations
            .iter()
            .any(|i| i.impl_id == implementation.impl_id)
        {
            self.implementations.push(implementation);
        }
    }

    /// Merge tags in; the union is order-independent
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.tags.push(tag.into());
        }
    }

    /// Normalise for output: append the unbound placeholder when no
    /// implementation is derivable, sort implementations by id, and
    /// sort + deduplicate tags (role label guaranteed present).
    pub fn finalize(&mut self) {
        if self.implementations.is_empty() {
            self.implementations.push(AgentImplementation::unbound());
        }
        self.implementations.sort_by(|a, b| a.impl_id.cmp(&b.impl_id));

        let mut tags: BTreeSet<String> = self.tags.drain(..).collect();
        tags.insert(self.role.label().to_string());
        self.tags = tags.into_iter().collect();
    }

    /// Whether any implementation is currently available
    pub fn has_available_implementation(&self) -> bool {
        self.implementations
            .iter()
            .any(|i| i.status == ImplStatus::Available)
    }
}

/// Baseline agent guaranteed to exist regardless of user configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupTemplate {
    /// Canonical agent id
    pub agent_id: String,

    /// Display name
    pub name: String,

    /// Role the canonical agent plays
    pub role: AgentRole,

    /// Module the template binds to when registered
    pub module_id: String,
}

/// The hard-coded baseline templates for the canonical roles
pub fn startup_templates() -> Vec<StartupTemplate> {
    let entries = [
        ("orchestrator", "Orchestrator", AgentRole::Orchestrator),
        ("researcher", "Researcher", AgentRole::Searcher),
        ("executor", "Executor", AgentRole::Executor),
        ("coder", "Coder", AgentRole::Executor),
        ("reviewer", "Reviewer", AgentRole::Reviewer),
    ];
    entries
        .iter()
        .map(|(id, name, role)| StartupTemplate {
            agent_id: id.to_string(),
            name: name.to_string(),
            role: *role,
            module_id: format!("{}-loop", id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_appends_unbound_when_empty() {
        let mut def = AgentDefinition::new(
            "executor",
            "Executor",
            AgentRole::Executor,
            DefinitionSource::AgentJson,
        );
        def.finalize();

        assert_eq!(def.implementations.len(), 1);
        assert_eq!(def.implementations[0].impl_id, "native:unbound");
        assert_eq!(def.implementations[0].status, ImplStatus::Unavailable);
    }

    #[test]
    fn test_finalize_sorts_and_dedups() {
        let mut def = AgentDefinition::new(
            "reviewer",
            "Reviewer",
            AgentRole::Reviewer,
            DefinitionSource::Module,
        );
        def.ensure_implementation(AgentImplementation::native_module("zz-loop"));
        def.ensure_implementation(AgentImplementation::native_module("aa-loop"));
        def.ensure_implementation(AgentImplementation::native_module("aa-loop"));
        def.add_tags(["review", "reviewer", "review"]);
        def.finalize();

        assert_eq!(def.implementations.len(), 2);
        assert_eq!(def.implementations[0].impl_id, "native:aa-loop");
        assert_eq!(def.tags, vec!["review", "reviewer"]);
    }

    #[test]
    fn test_tags_always_contain_role_label() {
        let mut def = AgentDefinition::new(
            "researcher",
            "Researcher",
            AgentRole::Searcher,
            DefinitionSource::Deployment,
        );
        def.tags.clear();
        def.finalize();

        assert!(def.tags.contains(&"searcher".to_string()));
    }

    #[test]
    fn test_startup_templates_cover_canonical_roles() {
        let templates = startup_templates();
        let ids: Vec<&str> = templates.iter().map(|t| t.agent_id.as_str()).collect();

        assert_eq!(
            ids,
            vec!["orchestrator", "researcher", "executor", "coder", "reviewer"]
        );
        assert!(templates.iter().all(|t| t.module_id.ends_with("-loop")));
    }
}
