//! Execution engine: drives one run through the handoff graph.
//!
//! A run is `Pending` until [`Workflow::run`] starts it, then `Running` until
//! exactly one of `Completed`, `Failed` or `Aborted`. Steps execute strictly
//! in sequence; the only suspension point is the agent invocation, which is
//! raced against the cancel signal and the optional step timeout.

use super::cancel::CancelSignal;
use super::events::{self, AbortReason, Event, EventKind, EventSink, EventStream};
use super::graph::WorkflowGraph;
use super::run::{RunResult, RunStatus};
use crate::agent::{AgentEntry, AgentRegistry, AgentReply, HandoffTarget, InvocationRequest};
use crate::conversation::Conversation;
use crate::error::{CapabilityError, RunError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_STEPS: usize = 10;

/// An immutable, validated workflow. Share it behind an `Arc` to run
/// concurrently.
#[derive(Debug)]
pub struct Workflow {
    entry: String,
    registry: AgentRegistry,
    graph: WorkflowGraph,
    max_steps: usize,
    step_timeout: Option<Duration>,
}

impl Workflow {
    /// Callers guarantee `entry` and every edge endpoint are registered.
    pub(crate) fn from_parts(
        entry: String,
        registry: AgentRegistry,
        graph: WorkflowGraph,
        max_steps: usize,
        step_timeout: Option<Duration>,
    ) -> Self {
        Self {
            entry,
            registry,
            graph,
            max_steps,
            step_timeout,
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout
    }

    /// Execute one run to a terminal state, reporting to `sink`.
    pub async fn run(
        &self,
        conversation: Conversation,
        sink: &mut dyn EventSink,
        cancel: &CancelSignal,
    ) -> RunResult {
        let mut emitter = Emitter {
            run_id: uuid::Uuid::new_v4().to_string(),
            seq: 0,
            sink,
        };
        let mut state = RunState {
            initial_len: conversation.len(),
            conversation,
            current: self.entry.clone(),
            status: RunStatus::Pending,
            steps: 0,
        };
        self.drive(&mut state, &mut emitter, cancel).await
    }

    /// Spawn a run on the tokio runtime and stream its events.
    pub fn run_streaming(
        self: &Arc<Self>,
        conversation: Conversation,
    ) -> (EventStream, JoinHandle<RunResult>) {
        self.run_streaming_with_cancel(conversation, CancelSignal::never())
    }

    pub fn run_streaming_with_cancel(
        self: &Arc<Self>,
        conversation: Conversation,
        cancel: CancelSignal,
    ) -> (EventStream, JoinHandle<RunResult>) {
        let (mut sink, stream) = events::channel();
        let workflow = Arc::clone(self);
        let handle =
            tokio::spawn(async move { workflow.run(conversation, &mut sink, &cancel).await });
        (stream, handle)
    }

    async fn drive(
        &self,
        state: &mut RunState,
        emitter: &mut Emitter<'_>,
        cancel: &CancelSignal,
    ) -> RunResult {
        state.status = RunStatus::Running;
        tracing::info!(
            run_id = %emitter.run_id,
            entry = %self.entry,
            max_steps = self.max_steps,
            "run started"
        );
        emitter.emit(EventKind::Started {
            entry: self.entry.clone(),
        });

        loop {
            if cancel.is_cancelled() {
                return self.abort(state, emitter, AbortReason::Cancelled);
            }
            if state.steps >= self.max_steps {
                return self.abort(state, emitter, self.step_limit());
            }

            let entry = match self.registry.resolve(&state.current) {
                Ok(entry) => entry,
                Err(e) => {
                    let source = CapabilityError::Backend(anyhow::Error::new(e));
                    return self.fail_capability(state, emitter, source);
                }
            };

            emitter.emit(EventKind::AgentInvoked {
                agent_id: entry.id.clone(),
                step: state.steps + 1,
            });
            let handoffs = self.handoff_targets(&entry.id);
            let outcome = self
                .invoke(entry, &handoffs, &state.conversation, emitter, cancel)
                .await;

            let reply = match outcome {
                Ok(reply) => reply,
                Err(CapabilityError::Cancelled) => {
                    return self.abort(state, emitter, AbortReason::Cancelled)
                }
                Err(source) => return self.fail_capability(state, emitter, source),
            };

            let AgentReply {
                mut message,
                is_final,
                handoff,
            } = reply;
            if message.author.is_none() {
                message.author = Some(entry.id.clone());
            }
            emitter.emit(EventKind::MessageProduced {
                agent_id: entry.id.clone(),
                message: message.clone(),
            });
            state.conversation.push(message);
            state.steps += 1;

            if is_final {
                return self.complete(state, emitter);
            }

            let next = match handoff {
                Some(target) => match self.graph.edge_between(&entry.id, &target) {
                    Some(edge) => Some(edge),
                    None => {
                        let error = RunError::HandoffNotPermitted {
                            from: entry.id.clone(),
                            to: target,
                        };
                        return self.fail(state, emitter, error);
                    }
                },
                None => state
                    .conversation
                    .last()
                    .and_then(|produced| self.graph.next_agent(&entry.id, produced)),
            };

            let Some(edge) = next else {
                return self.complete(state, emitter);
            };
            if state.steps >= self.max_steps {
                return self.abort(state, emitter, self.step_limit());
            }

            tracing::info!(
                run_id = %emitter.run_id,
                from = %edge.source,
                to = %edge.target,
                step = state.steps,
                "handoff"
            );
            emitter.emit(EventKind::HandoffOccurred {
                from: edge.source.clone(),
                to: edge.target.clone(),
                label: edge.label.clone(),
            });
            state.current = edge.target.clone();
        }
    }

    /// Invoke one agent, forwarding streamed chunks while it is pending.
    async fn invoke(
        &self,
        entry: &AgentEntry,
        handoffs: &[HandoffTarget],
        conversation: &Conversation,
        emitter: &mut Emitter<'_>,
        cancel: &CancelSignal,
    ) -> Result<AgentReply, CapabilityError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let request = InvocationRequest::new(&entry.id, conversation, cancel)
            .with_instructions(entry.instructions.as_deref())
            .with_handoffs(handoffs)
            .with_partial(&tx);

        let step_timeout = self.step_timeout;
        let call = async {
            match step_timeout {
                Some(limit) => tokio::time::timeout(limit, entry.capability.invoke(request))
                    .await
                    .unwrap_or(Err(CapabilityError::Timeout { after: limit })),
                None => entry.capability.invoke(request).await,
            }
        };
        tokio::pin!(call);

        let result = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Err(CapabilityError::Cancelled),
                Some(chunk) = rx.recv() => emitter.emit(EventKind::PartialOutput {
                    agent_id: entry.id.clone(),
                    chunk,
                }),
                result = &mut call => break result,
            }
        };

        while let Ok(chunk) = rx.try_recv() {
            emitter.emit(EventKind::PartialOutput {
                agent_id: entry.id.clone(),
                chunk,
            });
        }
        result
    }

    /// Explicit-only edges leaving `agent_id`, offered to the agent by name.
    fn handoff_targets(&self, agent_id: &str) -> Vec<HandoffTarget> {
        let mut targets: Vec<HandoffTarget> = Vec::new();
        for edge in self.graph.edges_from(agent_id).filter(|e| e.explicit_only) {
            if targets.iter().any(|t| t.id == edge.target) {
                continue;
            }
            let description = edge.label.clone().or_else(|| {
                self.registry
                    .resolve(&edge.target)
                    .ok()
                    .and_then(AgentEntry::description)
                    .map(str::to_string)
            });
            targets.push(HandoffTarget {
                id: edge.target.clone(),
                description,
            });
        }
        targets
    }

    fn step_limit(&self) -> AbortReason {
        AbortReason::StepLimit {
            max_steps: self.max_steps,
        }
    }

    fn complete(&self, state: &mut RunState, emitter: &mut Emitter<'_>) -> RunResult {
        state.status = RunStatus::Completed;
        tracing::info!(
            run_id = %emitter.run_id,
            agent_id = %state.current,
            steps = state.steps,
            "run completed"
        );
        emitter.emit(EventKind::Completed {
            agent_id: state.current.clone(),
            steps: state.steps,
        });
        state.finish(emitter, None, None)
    }

    fn fail_capability(
        &self,
        state: &mut RunState,
        emitter: &mut Emitter<'_>,
        source: CapabilityError,
    ) -> RunResult {
        let error = RunError::Capability {
            agent_id: state.current.clone(),
            source,
        };
        self.fail(state, emitter, error)
    }

    fn fail(&self, state: &mut RunState, emitter: &mut Emitter<'_>, error: RunError) -> RunResult {
        state.status = RunStatus::Failed;
        tracing::warn!(
            run_id = %emitter.run_id,
            agent_id = %state.current,
            error = %error,
            "run failed"
        );
        emitter.emit(EventKind::Failed {
            agent_id: Some(state.current.clone()),
            error: error.to_string(),
            steps: state.steps,
        });
        let failed_agent = Some(state.current.clone());
        state.finish(emitter, failed_agent, Some(error))
    }

    fn abort(
        &self,
        state: &mut RunState,
        emitter: &mut Emitter<'_>,
        reason: AbortReason,
    ) -> RunResult {
        state.status = RunStatus::Aborted;
        tracing::warn!(
            run_id = %emitter.run_id,
            agent_id = %state.current,
            steps = state.steps,
            ?reason,
            "run aborted"
        );
        let error = match &reason {
            AbortReason::Cancelled => RunError::Cancelled,
            AbortReason::StepLimit { max_steps } => RunError::HandoffLoopExceeded {
                max_steps: *max_steps,
            },
        };
        emitter.emit(EventKind::Aborted {
            reason,
            steps: state.steps,
        });
        state.finish(emitter, None, Some(error))
    }
}

/// Mutable state owned by one run.
struct RunState {
    conversation: Conversation,
    initial_len: usize,
    current: String,
    status: RunStatus,
    steps: usize,
}

impl RunState {
    fn finish(
        &mut self,
        emitter: &Emitter<'_>,
        failed_agent: Option<String>,
        error: Option<RunError>,
    ) -> RunResult {
        RunResult {
            run_id: emitter.run_id.clone(),
            status: self.status,
            conversation: std::mem::take(&mut self.conversation),
            steps: self.steps,
            last_agent: self.current.clone(),
            failed_agent,
            error,
            initial_len: self.initial_len,
        }
    }
}

/// Stamps run id, sequence number and time on every event.
struct Emitter<'s> {
    run_id: String,
    seq: u64,
    sink: &'s mut dyn EventSink,
}

impl Emitter<'_> {
    fn emit(&mut self, kind: EventKind) {
        let event = Event {
            run_id: self.run_id.clone(),
            seq: self.seq,
            timestamp: Utc::now(),
            kind,
        };
        self.seq += 1;
        self.sink.emit(&event);
    }
}
