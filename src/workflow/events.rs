//! Ordered, single-consumer run events.
//!
//! Each run emits events with strictly increasing sequence numbers to exactly
//! one [`EventSink`]. The last event of every run is terminal
//! ([`EventKind::Completed`], [`EventKind::Failed`] or [`EventKind::Aborted`]);
//! nothing is emitted after it.

use crate::conversation::Message;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    Cancelled,
    StepLimit { max_steps: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Started {
        entry: String,
    },
    AgentInvoked {
        agent_id: String,
        step: usize,
    },
    PartialOutput {
        agent_id: String,
        chunk: String,
    },
    MessageProduced {
        agent_id: String,
        message: Message,
    },
    HandoffOccurred {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Completed {
        agent_id: String,
        steps: usize,
    },
    Failed {
        agent_id: Option<String>,
        error: String,
        steps: usize,
    },
    Aborted {
        #[serde(flatten)]
        reason: AbortReason,
        steps: usize,
    },
}

impl EventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Completed { .. } | EventKind::Failed { .. } | EventKind::Aborted { .. }
        )
    }

    /// Stable snake_case name, used in logs and traces.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Started { .. } => "started",
            EventKind::AgentInvoked { .. } => "agent_invoked",
            EventKind::PartialOutput { .. } => "partial_output",
            EventKind::MessageProduced { .. } => "message_produced",
            EventKind::HandoffOccurred { .. } => "handoff_occurred",
            EventKind::Completed { .. } => "completed",
            EventKind::Failed { .. } => "failed",
            EventKind::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// The single consumer of a run's events, called synchronously in order.
pub trait EventSink: Send {
    fn emit(&mut self, event: &Event);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &Event) {
        (**self).emit(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &Event) {
        (**self).emit(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &Event) {}
}

/// Records every event in emission order.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Vec<Event>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Event kind names, handy for asserting sequences.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.kind.name()).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

/// Producer half of [`channel`]. Closes after forwarding a terminal event.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: &Event) {
        let Some(tx) = &self.tx else {
            return;
        };
        // A dropped consumer must not stop the run.
        let _ = tx.send(event.clone());
        if event.is_terminal() {
            self.tx = None;
        }
    }
}

/// Consumer half of [`channel`]. Yields `None` after the terminal event.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Drain the stream until it closes.
    pub async fn collect_all(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

/// Push-based ordered event channel for one run.
pub fn channel() -> (ChannelSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx: Some(tx) }, EventStream { rx })
}
