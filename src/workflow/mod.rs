//! Workflows: the handoff graph, the execution engine and its event stream.
//!
//! Build a [`Workflow`] with [`WorkflowBuilder`], [`Workflow::sequential`] or
//! a [`WorkflowDefinition`] file, then drive runs with [`Workflow::run`] or
//! [`Workflow::run_streaming`]. A built workflow is immutable and can serve
//! any number of concurrent runs behind an `Arc`.

pub mod builder;
pub mod cancel;
pub mod definition;
pub mod engine;
pub mod events;
pub mod fanout;
pub mod graph;
pub mod run;


pub use builder::WorkflowBuilder;
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use definition::{AgentKind, AgentSpec, EdgeSpec, GuardSpec, WorkflowDefinition};
pub use engine::{Workflow, DEFAULT_MAX_STEPS};
#[allow(unused_imports)]
pub use events::{
    channel, AbortReason, ChannelSink, CollectingSink, Event, EventKind, EventSink, EventStream,
    NullSink,
};
pub use fanout::run_concurrent;
pub use graph::{Edge, Guard, SwitchCase, WorkflowGraph};
pub use run::{RunResult, RunStatus};
