//! Concurrent fan-out of one conversation to several agents.

use super::cancel::CancelSignal;
use crate::agent::{AgentEntry, AgentReply, InvocationRequest};
use crate::conversation::Conversation;
use crate::error::RunError;
use futures::future::join_all;

/// Invoke every agent on the same conversation concurrently.
///
/// Replies come back in agent order with their author stamped. The first
/// failure in agent order fails the whole fan-out.
pub async fn run_concurrent(
    agents: &[AgentEntry],
    conversation: &Conversation,
) -> Result<Vec<AgentReply>, RunError> {
    let cancel = CancelSignal::never();
    let calls = agents.iter().map(|agent| {
        let request = InvocationRequest::new(&agent.id, conversation, &cancel)
            .with_instructions(agent.instructions.as_deref());
        agent.capability.invoke(request)
    });

    tracing::debug!(agents = agents.len(), "fan-out started");
    let results = join_all(calls).await;

    agents
        .iter()
        .zip(results)
        .map(|(agent, result)| {
            let mut reply = result.map_err(|source| RunError::Capability {
                agent_id: agent.id.clone(),
                source,
            })?;
            if reply.message.author.is_none() {
                reply.message.author = Some(agent.id.clone());
            }
            Ok(reply)
        })
        .collect()
}
