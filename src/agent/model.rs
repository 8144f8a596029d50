//! Model-backed agent over any [`Provider`].

use super::traits::{AgentCapability, AgentReply, HandoffTarget, InvocationRequest};
use crate::conversation::{Message, Role};
use crate::error::CapabilityError;
use crate::conversation::Attachment;
use crate::providers::{
    ChatMessage, ChatRequest, ChatResponse, Provider, ReasoningEffort, ResponseFormat,
};
use crate::tools::{self, ToolSpec};
use async_trait::async_trait;
use schemars::JsonSchema;
use std::sync::Arc;

const HANDOFF_TOOL_PREFIX: &str = "handoff_to_";

/// Calls a chat completion backend once per invocation.
pub struct ModelAgent {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    reasoning_effort: Option<ReasoningEffort>,
    stream: bool,
    output: Option<ResponseFormat>,
    description: Option<String>,
}

impl ModelAgent {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            reasoning_effort: None,
            stream: false,
            output: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Reasoning budget; backends drop `temperature` when this is set.
    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: Option<ReasoningEffort>) -> Self {
        self.reasoning_effort = effort;
        self
    }

    /// Stream tokens as partial output when the caller listens.
    #[must_use]
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Request JSON output matching the schema of `T`; replies become
    /// structured content.
    #[must_use]
    pub fn with_output_schema<T: JsonSchema>(mut self) -> Self {
        let schema = schemars::schema_for!(T);
        self.output = Some(ResponseFormat::JsonSchema {
            name: schema_name::<T>(),
            schema: serde_json::to_value(schema).unwrap_or_default(),
        });
        self
    }

    /// Request any JSON object; replies become structured content.
    #[must_use]
    pub fn with_json_output(mut self) -> Self {
        self.output = Some(ResponseFormat::JsonObject);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn output_format(&self) -> Option<&ResponseFormat> {
        self.output.as_ref()
    }

    /// One round trip to the provider, streaming when enabled and observed.
    pub(crate) async fn complete(
        &self,
        request: &InvocationRequest<'_>,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, CapabilityError> {
        let chat = ChatRequest {
            messages,
            tools: (!tools.is_empty()).then_some(tools),
            response_format: self.output.as_ref(),
            model: &self.model,
            temperature: self.temperature,
            reasoning_effort: self.reasoning_effort,
        };

        let response = match request.partial {
            Some(tx) if self.stream => self.provider.stream_chat(chat, tx.clone()).await?,
            _ => self.provider.chat(chat).await?,
        };

        if let Some(usage) = &response.usage {
            tracing::debug!(
                agent_id = request.agent_id,
                provider = self.provider.name(),
                model = %self.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "model call finished"
            );
        }
        Ok(response)
    }

    /// Turn the final model text into the produced message.
    pub(crate) fn finish(&self, text: Option<String>) -> Result<AgentReply, CapabilityError> {
        let text = text.unwrap_or_default();
        if self.output.is_none() {
            return Ok(AgentReply::text(text));
        }
        let value: serde_json::Value = serde_json::from_str(text.trim()).map_err(|e| {
            CapabilityError::Backend(anyhow::anyhow!(
                "model returned invalid JSON for structured output: {e}"
            ))
        })?;
        Ok(AgentReply::new(Message::structured(Role::Agent, value)))
    }
}

#[async_trait]
impl AgentCapability for ModelAgent {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<AgentReply, CapabilityError> {
        let messages = chat_messages(&request);
        let tools = handoff_tool_specs(request.handoffs);
        let response = self.complete(&request, &messages, &tools).await?;

        if let Some(target) = requested_handoff(&response, request.handoffs) {
            return Ok(handoff_reply(response.text, target));
        }
        self.finish(response.text)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn name(&self) -> &str {
        "model"
    }
}

/// Render the invocation as provider chat turns, instructions first.
pub(crate) fn chat_messages(request: &InvocationRequest<'_>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.conversation.len() + 1);
    if let Some(instructions) = request.instructions.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(instructions));
    }
    for message in request.conversation {
        let text = message.text();
        messages.push(match message.role {
            Role::User => ChatMessage::user(text)
                .with_images(message.attachments.iter().map(Attachment::to_uri).collect()),
            Role::System => ChatMessage::system(text),
            Role::Agent | Role::Tool => ChatMessage::assistant(text),
        });
    }
    messages
}

/// Tool names for `handoffs`, index-aligned and unique.
fn handoff_tool_names(handoffs: &[HandoffTarget]) -> Vec<String> {
    tools::unique_tool_names(
        handoffs
            .iter()
            .map(|target| format!("{HANDOFF_TOOL_PREFIX}{}", tools::tool_name_fragment(&target.id)))
            .collect(),
    )
}

/// One tool per permitted handoff, so the model can route explicitly.
pub(crate) fn handoff_tool_specs(handoffs: &[HandoffTarget]) -> Vec<ToolSpec> {
    handoffs
        .iter()
        .zip(handoff_tool_names(handoffs))
        .map(|(target, name)| ToolSpec {
            name,
            description: target
                .description
                .clone()
                .unwrap_or_else(|| format!("Hand off the conversation to agent '{}'", target.id)),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        })
        .collect()
}

/// First handoff tool call in the response, resolved to its target.
pub(crate) fn requested_handoff<'a>(
    response: &ChatResponse,
    handoffs: &'a [HandoffTarget],
) -> Option<&'a HandoffTarget> {
    let names = handoff_tool_names(handoffs);
    response.tool_calls.iter().find_map(|call| {
        names
            .iter()
            .position(|name| *name == call.name)
            .map(|index| &handoffs[index])
    })
}

pub(crate) fn handoff_reply(text: Option<String>, target: &HandoffTarget) -> AgentReply {
    let text = text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("Handing off to {}", target.id));
    AgentReply::text(text).with_handoff(target.id.clone())
}

fn schema_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    let name: String = short
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        "output".to_string()
    } else {
        name
    }
}
