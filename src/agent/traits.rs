//! The polymorphic agent capability interface.

use crate::conversation::{Conversation, Message};
use crate::error::CapabilityError;
use crate::workflow::CancelSignal;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Channel for streamed output chunks of a pending invocation.
pub type PartialSender = mpsc::UnboundedSender<String>;

/// An agent the current agent may explicitly hand off to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffTarget {
    pub id: String,
    pub description: Option<String>,
}

/// Everything a capability sees for one invocation.
#[derive(Clone, Copy)]
pub struct InvocationRequest<'a> {
    /// Registered id of the agent being invoked.
    pub agent_id: &'a str,
    pub instructions: Option<&'a str>,
    pub conversation: &'a Conversation,
    pub handoffs: &'a [HandoffTarget],
    pub partial: Option<&'a PartialSender>,
    pub cancel: &'a CancelSignal,
}

impl<'a> InvocationRequest<'a> {
    pub fn new(
        agent_id: &'a str,
        conversation: &'a Conversation,
        cancel: &'a CancelSignal,
    ) -> Self {
        Self {
            agent_id,
            instructions: None,
            conversation,
            handoffs: &[],
            partial: None,
            cancel,
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: Option<&'a str>) -> Self {
        self.instructions = instructions;
        self
    }

    #[must_use]
    pub fn with_handoffs(mut self, handoffs: &'a [HandoffTarget]) -> Self {
        self.handoffs = handoffs;
        self
    }

    #[must_use]
    pub fn with_partial(mut self, partial: &'a PartialSender) -> Self {
        self.partial = Some(partial);
        self
    }

    /// Forward a streamed chunk; silently dropped when nobody listens.
    pub fn emit_partial(&self, chunk: impl Into<String>) {
        if let Some(tx) = self.partial {
            let _ = tx.send(chunk.into());
        }
    }
}

/// Output of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub message: Message,
    /// Ends the run regardless of outgoing edges.
    pub is_final: bool,
    /// Explicit handoff request; must name an existing edge target.
    pub handoff: Option<String>,
}

impl AgentReply {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            is_final: false,
            handoff: None,
        }
    }

    /// Plain agent text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Message::agent(text))
    }

    #[must_use]
    pub fn into_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    #[must_use]
    pub fn with_handoff(mut self, target: impl Into<String>) -> Self {
        self.handoff = Some(target.into());
        self
    }
}

/// A unit that consumes a conversation and produces one reply.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<AgentReply, CapabilityError>;

    /// Used when the agent is exposed as a tool of another agent.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Short variant name for logs (`model`, `tools`, `scripted`, ...).
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_builders_compose() {
        let reply = AgentReply::text("done").into_final().with_handoff("b");
        assert!(reply.is_final);
        assert_eq!(reply.handoff.as_deref(), Some("b"));
        assert_eq!(reply.message.text(), "done");
    }

    #[tokio::test]
    async fn emit_partial_reaches_listener() {
        let conversation = Conversation::from_user("hi");
        let cancel = CancelSignal::never();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = InvocationRequest::new("a", &conversation, &cancel).with_partial(&tx);

        request.emit_partial("chunk");
        assert_eq!(rx.recv().await.as_deref(), Some("chunk"));
    }

    #[test]
    fn emit_partial_without_listener_is_noop() {
        let conversation = Conversation::new();
        let cancel = CancelSignal::never();
        InvocationRequest::new("a", &conversation, &cancel).emit_partial("dropped");
    }
}
