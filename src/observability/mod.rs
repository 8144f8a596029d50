//! Run observability: structured logging of events and the runtime trace file.

pub mod runtime_trace;

pub use runtime_trace::{RuntimeTrace, TraceMode};

use crate::workflow::{Event, EventKind, EventSink};

/// Logs every run event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: &Event) {
        let run_id = event.run_id.as_str();
        let seq = event.seq;
        match &event.kind {
            EventKind::Started { entry } => {
                tracing::info!(run_id, seq, entry = %entry, "run event: started");
            }
            EventKind::AgentInvoked { agent_id, step } => {
                tracing::debug!(run_id, seq, agent_id = %agent_id, step, "run event: agent invoked");
            }
            EventKind::PartialOutput { agent_id, chunk } => {
                tracing::trace!(run_id, seq, agent_id = %agent_id, chunk = %chunk, "run event: partial output");
            }
            EventKind::MessageProduced { agent_id, message } => {
                tracing::debug!(
                    run_id,
                    seq,
                    agent_id = %agent_id,
                    chars = message.text().len(),
                    warnings = message.warnings().count(),
                    "run event: message produced"
                );
            }
            EventKind::HandoffOccurred { from, to, label } => {
                tracing::info!(
                    run_id,
                    seq,
                    from = %from,
                    to = %to,
                    label = label.as_deref().unwrap_or(""),
                    "run event: handoff"
                );
            }
            EventKind::Completed { agent_id, steps } => {
                tracing::info!(run_id, seq, agent_id = %agent_id, steps, "run event: completed");
            }
            EventKind::Failed {
                agent_id,
                error,
                steps,
            } => {
                tracing::warn!(
                    run_id,
                    seq,
                    agent_id = agent_id.as_deref().unwrap_or(""),
                    steps,
                    error = %error,
                    "run event: failed"
                );
            }
            EventKind::Aborted { reason, steps } => {
                tracing::warn!(run_id, seq, steps, ?reason, "run event: aborted");
            }
        }
    }
}
