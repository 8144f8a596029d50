//! Error taxonomy for workflow construction and execution.
//!
//! Construction errors ([`WorkflowError`]) are returned immediately and never
//! allow a malformed workflow to start a run. Run-time errors ([`RunError`])
//! only terminate the affected run and are reported through its terminal
//! event and [`RunResult`](crate::workflow::RunResult).

use std::time::Duration;
use thiserror::Error;

/// Errors raised while registering agents or wiring the workflow graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("unknown agent: {id}")]
    UnknownAgent { id: String },

    #[error("agent already registered: {id}")]
    DuplicateAgent { id: String },

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),
}

/// Failure of a single agent invocation.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The underlying backend (model provider, tool, delegate) failed.
    #[error("{0:#}")]
    Backend(#[from] anyhow::Error),

    #[error("agent did not respond within {after:?}")]
    Timeout { after: Duration },

    #[error("tool loop exceeded {max} iterations without a final answer")]
    ToolLoopExceeded { max: usize },

    #[error("{0}")]
    Script(String),

    #[error("invocation cancelled")]
    Cancelled,
}

/// Why a run stopped without completing.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("agent '{agent_id}' failed: {source}")]
    Capability {
        agent_id: String,
        #[source]
        source: CapabilityError,
    },

    #[error("handoff limit of {max_steps} steps exceeded")]
    HandoffLoopExceeded { max_steps: usize },

    #[error("agent '{from}' requested handoff to '{to}' but no such edge exists")]
    HandoffNotPermitted { from: String, to: String },

    #[error("run cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_error_wraps_anyhow_with_context_chain() {
        let err: CapabilityError = anyhow::anyhow!("connection reset")
            .context("openai request failed")
            .into();
        let text = err.to_string();
        assert!(text.contains("openai request failed"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn run_error_names_failing_agent() {
        let err = RunError::Capability {
            agent_id: "allocator".into(),
            source: CapabilityError::Timeout {
                after: Duration::from_secs(30),
            },
        };
        assert_eq!(
            err.to_string(),
            "agent 'allocator' failed: agent did not respond within 30s"
        );
    }

    #[test]
    fn workflow_error_messages() {
        let unknown = WorkflowError::UnknownAgent { id: "ghost".into() };
        assert_eq!(unknown.to_string(), "unknown agent: ghost");
        let dup = WorkflowError::DuplicateAgent { id: "a".into() };
        assert_eq!(dup.to_string(), "agent already registered: a");
    }
}
