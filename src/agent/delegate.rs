//! Agent-as-tool delegation.

use super::model::ModelAgent;
use super::registry::AgentEntry;
use super::tooled::ToolAgent;
use super::traits::{AgentCapability, AgentReply, InvocationRequest};
use crate::conversation::Conversation;
use crate::error::CapabilityError;
use crate::tools::{self, Tool, ToolResult};
use crate::workflow::CancelSignal;
use async_trait::async_trait;
use std::sync::Arc;

/// Exposes a registered agent through the tool interface.
///
/// The wrapped agent runs on a fresh conversation holding only the `input`
/// argument, with its own instructions.
pub struct AgentTool {
    entry: AgentEntry,
    name: String,
    description: String,
}

impl AgentTool {
    pub fn new(entry: AgentEntry) -> Self {
        let name = tools::tool_name_fragment(&entry.id);
        Self::named(entry, name)
    }

    fn named(entry: AgentEntry, name: String) -> Self {
        let description = entry
            .description()
            .map_or_else(|| format!("Ask agent '{}'", entry.id), str::to_string);
        Self {
            entry,
            name,
            description,
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "The request to send to the agent"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let input = args
            .get("input")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing 'input' parameter"))?;

        let conversation = Conversation::from_user(input);
        let cancel = CancelSignal::never();
        let request = InvocationRequest::new(&self.entry.id, &conversation, &cancel)
            .with_instructions(self.entry.instructions.as_deref());

        tracing::info!(delegate = %self.entry.id, "delegating to agent");
        Ok(match self.entry.capability.invoke(request).await {
            Ok(reply) => ToolResult::ok(reply.message.text()),
            Err(e) => ToolResult::err(format!("agent '{}' failed: {e}", self.entry.id)),
        })
    }
}

/// A tool agent whose tools are other agents.
pub struct DelegatingAgent {
    inner: ToolAgent,
}

impl DelegatingAgent {
    pub fn new(model: ModelAgent, delegates: Vec<AgentEntry>) -> Self {
        let names = tools::unique_tool_names(
            delegates
                .iter()
                .map(|entry| tools::tool_name_fragment(&entry.id))
                .collect(),
        );
        let tools = delegates
            .into_iter()
            .zip(names)
            .map(|(entry, name)| Arc::new(AgentTool::named(entry, name)) as Arc<dyn Tool>)
            .collect();
        Self {
            inner: ToolAgent::new(model, tools),
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.inner = self.inner.with_max_iterations(max_iterations);
        self
    }

    /// Delegate names in the order they are offered to the model.
    pub fn delegates(&self) -> impl Iterator<Item = &str> {
        self.inner.tools().iter().map(|t| t.name())
    }
}

#[async_trait]
impl AgentCapability for DelegatingAgent {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<AgentReply, CapabilityError> {
        self.inner.invoke(request).await
    }

    fn description(&self) -> Option<&str> {
        self.inner.description()
    }

    fn name(&self) -> &str {
        "delegate"
    }
}
