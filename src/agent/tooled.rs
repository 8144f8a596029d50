//! Tool-augmented agent: model → tool calls → tool results loop.

use super::model::{
    chat_messages, handoff_reply, handoff_tool_specs, requested_handoff, ModelAgent,
};
use super::traits::{AgentCapability, AgentReply, InvocationRequest};
use crate::error::CapabilityError;
use crate::providers::{ChatMessage, ToolCall};
use crate::tools::{Tool, ToolSpec};
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;

/// A model agent that may call local tools before answering.
///
/// Tool call and tool result turns stay private to the invocation; only the
/// final answer is appended to the conversation.
pub struct ToolAgent {
    model: ModelAgent,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
}

impl ToolAgent {
    pub fn new(model: ModelAgent, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            model,
            tools,
            max_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    async fn execute_call(&self, agent_id: &str, call: &ToolCall) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            tracing::warn!(agent_id, tool = %call.name, "model requested unknown tool");
            return format!("Error: unknown tool '{}'", call.name);
        };

        let args = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str::<serde_json::Value>(&call.arguments) {
                Ok(args) => args,
                Err(e) => return format!("Error: invalid arguments for '{}': {e}", call.name),
            }
        };

        tracing::info!(agent_id, tool = %call.name, arguments = %call.arguments, "tool call");
        match tool.execute(args).await {
            Ok(result) => result.as_model_text(),
            Err(e) => format!("Error: {e:#}"),
        }
    }
}

#[async_trait]
impl AgentCapability for ToolAgent {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<AgentReply, CapabilityError> {
        let mut messages = chat_messages(&request);
        let mut specs: Vec<ToolSpec> = self.tools.iter().map(|t| t.spec()).collect();
        specs.extend(handoff_tool_specs(request.handoffs));

        for iteration in 0..self.max_iterations {
            let response = self.model.complete(&request, &messages, &specs).await?;

            if let Some(target) = requested_handoff(&response, request.handoffs) {
                return Ok(handoff_reply(response.text, target));
            }
            if !response.has_tool_calls() {
                return self.model.finish(response.text);
            }

            tracing::debug!(
                agent_id = request.agent_id,
                iteration,
                calls = response.tool_calls.len(),
                "executing tool calls"
            );
            messages.push(ChatMessage::assistant_tool_calls(
                response.text.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let output = self.execute_call(request.agent_id, call).await;
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
        }

        Err(CapabilityError::ToolLoopExceeded {
            max: self.max_iterations,
        })
    }

    fn description(&self) -> Option<&str> {
        self.model.description()
    }

    fn name(&self) -> &str {
        "tools"
    }
}
