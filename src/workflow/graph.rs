//! Directed handoff graph between registered agents.

use crate::agent::AgentRegistry;
use crate::conversation::Message;
use crate::error::WorkflowError;
use std::fmt;
use std::sync::Arc;

/// Predicate over the just-produced message.
#[derive(Clone)]
pub struct Guard(Arc<dyn Fn(&Message) -> bool + Send + Sync>);

impl Guard {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn accepts(&self, message: &Message) -> bool {
        (self.0)(message)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub guard: Option<Guard>,
    pub label: Option<String>,
    /// Only traversed when the source agent asks for it by name.
    pub explicit_only: bool,
}

impl Edge {
    /// Unconditional edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            guard: None,
            label: None,
            explicit_only: false,
        }
    }

    /// Edge taken only on an explicit handoff request from `source`.
    pub fn handoff(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            explicit_only: true,
            ..Self::new(source, target)
        }
    }

    #[must_use]
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    #[must_use]
    pub fn when<F>(self, f: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.with_guard(Guard::new(f))
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether automatic routing may follow this edge for `produced`.
    pub fn accepts(&self, produced: &Message) -> bool {
        !self.explicit_only && self.guard.as_ref().map_or(true, |g| g.accepts(produced))
    }
}

/// One branch of a switch.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub target: String,
    pub guard: Guard,
    pub label: Option<String>,
}

impl SwitchCase {
    pub fn new(target: impl Into<String>, guard: Guard) -> Self {
        Self {
            target: target.into(),
            guard,
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Edges in registration order. Read-only once the workflow is built.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_endpoint(registry: &AgentRegistry, id: &str) -> Result<(), WorkflowError> {
        if registry.contains(id) {
            Ok(())
        } else {
            Err(WorkflowError::UnknownAgent { id: id.to_string() })
        }
    }

    /// Add one edge; the graph is unchanged on failure.
    pub fn add_edge(&mut self, registry: &AgentRegistry, edge: Edge) -> Result<(), WorkflowError> {
        Self::check_endpoint(registry, &edge.source)?;
        Self::check_endpoint(registry, &edge.target)?;
        self.edges.push(edge);
        Ok(())
    }

    /// Add guarded cases in order, then an optional unconditional default.
    /// Every endpoint is validated before any edge is added.
    pub fn add_switch(
        &mut self,
        registry: &AgentRegistry,
        source: &str,
        cases: Vec<SwitchCase>,
        default: Option<&str>,
    ) -> Result<(), WorkflowError> {
        Self::check_endpoint(registry, source)?;
        for case in &cases {
            Self::check_endpoint(registry, &case.target)?;
        }
        if let Some(target) = default {
            Self::check_endpoint(registry, target)?;
        }

        for case in cases {
            let mut edge = Edge::new(source, case.target).with_guard(case.guard);
            edge.label = case.label;
            self.edges.push(edge);
        }
        if let Some(target) = default {
            self.edges.push(Edge::new(source, target));
        }
        Ok(())
    }

    /// First edge leaving `current` whose guard accepts `produced`.
    /// `None` means the run terminates at `current`.
    pub fn next_agent(&self, current: &str, produced: &Message) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|edge| edge.source == current && edge.accepts(produced))
    }

    /// Edge used to validate an explicit handoff request.
    pub fn edge_between(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|edge| edge.source == source && edge.target == target)
    }

    pub fn edges_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.source == source)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
