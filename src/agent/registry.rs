//! Agent registry: id → capability.

use super::traits::AgentCapability;
use crate::error::WorkflowError;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered agent. Immutable once registered.
#[derive(Clone)]
pub struct AgentEntry {
    pub id: String,
    pub capability: Arc<dyn AgentCapability>,
    pub instructions: Option<String>,
    pub description: Option<String>,
}

impl AgentEntry {
    pub fn new(id: impl Into<String>, capability: Arc<dyn AgentCapability>) -> Self {
        Self {
            id: id.into(),
            capability,
            instructions: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Registered description, falling back to the capability's own.
    pub fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .or_else(|| self.capability.description())
    }
}

impl std::fmt::Debug for AgentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEntry")
            .field("id", &self.id)
            .field("capability", &self.capability.name())
            .field("instructions", &self.instructions)
            .field("description", &self.description)
            .finish()
    }
}

/// Registration-ordered set of agents. No removal.
#[derive(Debug, Default, Clone)]
pub struct AgentRegistry {
    entries: Vec<AgentEntry>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        capability: Arc<dyn AgentCapability>,
    ) -> Result<(), WorkflowError> {
        self.register_entry(AgentEntry::new(id, capability))
    }

    /// Register a fully described agent. The registry is unchanged on failure.
    pub fn register_entry(&mut self, entry: AgentEntry) -> Result<(), WorkflowError> {
        if entry.id.trim().is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "agent id must not be empty".into(),
            ));
        }
        if self.index.contains_key(&entry.id) {
            return Err(WorkflowError::DuplicateAgent { id: entry.id });
        }

        tracing::debug!(agent_id = %entry.id, kind = entry.capability.name(), "agent registered");
        self.index.insert(entry.id.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Result<&AgentEntry, WorkflowError> {
        self.index
            .get(id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| WorkflowError::UnknownAgent { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn entries(&self) -> &[AgentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
