//! Fluent workflow construction.

use super::engine::{Workflow, DEFAULT_MAX_STEPS};
use super::graph::{Edge, Guard, SwitchCase, WorkflowGraph};
use crate::agent::{AgentCapability, AgentEntry, AgentRegistry};
use crate::conversation::Message;
use crate::error::WorkflowError;
use std::sync::Arc;
use std::time::Duration;

/// Collects agents and edges, then validates everything in [`build`](Self::build).
///
/// Registration and wiring errors are deferred so calls can be chained; the
/// first one is returned from `build` and no workflow is produced.
pub struct WorkflowBuilder {
    entry: String,
    registry: AgentRegistry,
    graph: WorkflowGraph,
    max_steps: usize,
    step_timeout: Option<Duration>,
    error: Option<WorkflowError>,
}

impl WorkflowBuilder {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            registry: AgentRegistry::new(),
            graph: WorkflowGraph::new(),
            max_steps: DEFAULT_MAX_STEPS,
            step_timeout: None,
            error: None,
        }
    }

    fn record(&mut self, result: Result<(), WorkflowError>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    #[must_use]
    pub fn agent(self, id: impl Into<String>, capability: Arc<dyn AgentCapability>) -> Self {
        self.agent_entry(AgentEntry::new(id, capability))
    }

    #[must_use]
    pub fn agent_entry(mut self, entry: AgentEntry) -> Self {
        let result = self.registry.register_entry(entry);
        self.record(result);
        self
    }

    /// Unconditional edge.
    #[must_use]
    pub fn edge(self, source: &str, target: &str) -> Self {
        self.add(Edge::new(source, target))
    }

    #[must_use]
    pub fn guarded_edge<F>(self, source: &str, target: &str, guard: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.add(Edge::new(source, target).when(guard))
    }

    /// Any prepared edge.
    #[must_use]
    pub fn add(mut self, edge: Edge) -> Self {
        let result = self.graph.add_edge(&self.registry, edge);
        self.record(result);
        self
    }

    /// Let `from` hand off to each of `targets` by explicit request.
    #[must_use]
    pub fn handoffs(mut self, from: &str, targets: &[&str]) -> Self {
        for target in targets {
            self = self.add(Edge::handoff(from, *target));
        }
        self
    }

    /// Let each of `sources` hand back to `to` by explicit request.
    #[must_use]
    pub fn handoffs_back(mut self, sources: &[&str], to: &str, label: Option<&str>) -> Self {
        for source in sources {
            let mut edge = Edge::handoff(*source, to);
            edge.label = label.map(str::to_string);
            self = self.add(edge);
        }
        self
    }

    /// Guarded cases in order, then an optional default.
    #[must_use]
    pub fn switch(mut self, source: &str, cases: Vec<SwitchCase>, default: Option<&str>) -> Self {
        let result = self
            .graph
            .add_switch(&self.registry, source, cases, default);
        self.record(result);
        self
    }

    /// Convenience for a single guarded case.
    #[must_use]
    pub fn case<F>(target: &str, guard: F) -> SwitchCase
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        SwitchCase::new(target, Guard::new(guard))
    }

    #[must_use]
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if !self.registry.contains(&self.entry) {
            return Err(WorkflowError::UnknownAgent { id: self.entry });
        }
        tracing::debug!(
            entry = %self.entry,
            agents = self.registry.len(),
            edges = self.graph.edge_count(),
            "workflow built"
        );
        Ok(Workflow::from_parts(
            self.entry,
            self.registry,
            self.graph,
            self.max_steps,
            self.step_timeout,
        ))
    }
}

impl Workflow {
    /// Chain agents with unconditional edges in the given order.
    pub fn sequential(agents: Vec<AgentEntry>) -> Result<Workflow, WorkflowError> {
        let Some(first) = agents.first() else {
            return Err(WorkflowError::InvalidDefinition(
                "sequential workflow needs at least one agent".into(),
            ));
        };
        let ids: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();
        let mut builder = WorkflowBuilder::new(first.id.clone()).max_steps(ids.len().max(1));
        for agent in agents {
            builder = builder.agent_entry(agent);
        }
        for pair in ids.windows(2) {
            builder = builder.edge(&pair[0], &pair[1]);
        }
        builder.build()
    }
}
