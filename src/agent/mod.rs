//! Agents: the capability interface, its variants and the registry.
//!
//! Every agent implements [`AgentCapability`]: one async call from the
//! conversation so far to an [`AgentReply`]. Variants range from the
//! provider-backed [`ModelAgent`] through the tool loop of [`ToolAgent`] and
//! agent-as-tool delegation in [`DelegatingAgent`] to the backend-free
//! [`ScriptedAgent`] and [`FnAgent`].

pub mod delegate;
pub mod model;
pub mod registry;
pub mod scripted;
pub mod tooled;
pub mod traits;

pub use delegate::{AgentTool, DelegatingAgent};
pub use model::ModelAgent;
pub use registry::{AgentEntry, AgentRegistry};
pub use scripted::{Exhaustion, FnAgent, ScriptedAgent};
pub use tooled::{ToolAgent, DEFAULT_MAX_TOOL_ITERATIONS};
#[allow(unused_imports)]
pub use traits::{AgentCapability, AgentReply, HandoffTarget, InvocationRequest, PartialSender};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::providers::{
        ChatMessage, ChatRequest, ChatResponse, Provider, ReasoningEffort, ToolCall,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Provider replaying queued responses and recording every request.
    pub struct QueueProvider {
        responses: Mutex<VecDeque<ChatResponse>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
        tools: Mutex<Vec<Vec<String>>>,
        efforts: Mutex<Vec<Option<ReasoningEffort>>>,
    }

    impl QueueProvider {
        pub fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                tools: Mutex::new(Vec::new()),
                efforts: Mutex::new(Vec::new()),
            }
        }

        pub fn text<const N: usize>(texts: [&str; N]) -> Self {
            Self::new(
                texts
                    .iter()
                    .map(|t| ChatResponse {
                        text: Some((*t).to_string()),
                        ..ChatResponse::default()
                    })
                    .collect(),
            )
        }

        pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().clone()
        }

        pub fn tool_names(&self) -> Vec<Vec<String>> {
            self.tools.lock().clone()
        }

        pub fn reasoning_efforts(&self) -> Vec<Option<ReasoningEffort>> {
            self.efforts.lock().clone()
        }
    }

    #[async_trait]
    impl Provider for QueueProvider {
        async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
            self.requests.lock().push(request.messages.to_vec());
            self.efforts.lock().push(request.reasoning_effort);
            self.tools.lock().push(
                request
                    .tools
                    .unwrap_or_default()
                    .iter()
                    .map(|t| t.name.clone())
                    .collect(),
            );
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no queued responses left"))
        }

        fn name(&self) -> &str {
            "queue"
        }
    }

    pub fn tool_call_response(id: &str, name: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
            usage: None,
        }
    }
}
