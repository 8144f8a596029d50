//! Generic OpenAI-compatible provider.
//! OpenAI, Azure OpenAI, Ollama and Foundry Local all accept the same
//! `/chat/completions` request shape; they differ in URL layout and auth header.

use crate::providers::traits::{
    ChatMessage, ChatRequest, ChatResponse, Provider, ReasoningEffort, ResponseFormat, TokenUsage,
    ToolCall,
};
use crate::tools::ToolSpec;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// How the provider expects the API key to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure OpenAI)
    ApiKey,
    /// Local runtimes that take no credential.
    None,
}

/// How the chat completions URL is derived from the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlStyle {
    /// `{base}/chat/completions`
    OpenAi,
    /// `{base}/openai/deployments/{model}/chat/completions?api-version={v}`
    AzureDeployment { api_version: String },
}

pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) auth: AuthStyle,
    pub(crate) url_style: UrlStyle,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>, auth: AuthStyle) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            auth,
            url_style: UrlStyle::OpenAi,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Azure OpenAI: the model argument names the deployment.
    pub fn azure(endpoint: &str, api_key: Option<&str>, api_version: &str) -> Self {
        let mut provider = Self::new("azure", endpoint, api_key, AuthStyle::ApiKey);
        provider.url_style = UrlStyle::AzureDeployment {
            api_version: api_version.to_string(),
        };
        provider
    }

    /// Build the full URL for chat completions, detecting if base_url already includes the path.
    fn chat_completions_url(&self, model: &str) -> String {
        match &self.url_style {
            UrlStyle::AzureDeployment { api_version } => format!(
                "{}/openai/deployments/{model}/chat/completions?api-version={api_version}",
                self.base_url
            ),
            UrlStyle::OpenAi => {
                let has_full_endpoint = reqwest::Url::parse(&self.base_url)
                    .map(|url| {
                        url.path()
                            .trim_end_matches('/')
                            .ends_with("/chat/completions")
                    })
                    .unwrap_or_else(|_| self.base_url.ends_with("/chat/completions"));

                if has_full_endpoint {
                    self.base_url.clone()
                } else {
                    format!("{}/chat/completions", self.base_url)
                }
            }
        }
    }

    fn credential(&self) -> anyhow::Result<Option<&str>> {
        match self.auth {
            AuthStyle::None => Ok(None),
            AuthStyle::Bearer | AuthStyle::ApiKey => {
                let key = self.api_key.as_deref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "{} API key not set. Set `api_key` in config.toml or the appropriate env var.",
                        self.name
                    )
                })?;
                Ok(Some(key))
            }
        }
    }

    fn apply_auth_header(
        &self,
        req: reqwest::RequestBuilder,
        api_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match (&self.auth, api_key) {
            (AuthStyle::Bearer, Some(key)) => req.header("Authorization", format!("Bearer {key}")),
            (AuthStyle::ApiKey, Some(key)) => req.header("api-key", key),
            _ => req,
        }
    }

    fn build_request<'a>(request: &ChatRequest<'a>, stream: bool) -> ApiChatRequest<'a> {
        ApiChatRequest {
            model: request.model,
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            // Reasoning models reject any temperature but the default.
            temperature: request
                .reasoning_effort
                .is_none()
                .then_some(request.temperature),
            reasoning_effort: request.reasoning_effort,
            stream: Some(stream),
            tools: request
                .tools
                .filter(|tools| !tools.is_empty())
                .map(|tools| tools.iter().map(ApiTool::from).collect()),
            response_format: request.response_format.map(response_format_json),
        }
    }

    async fn send(
        &self,
        request: &ChatRequest<'_>,
        stream: bool,
    ) -> anyhow::Result<reqwest::Response> {
        let api_key = self.credential()?;
        let body = Self::build_request(request, stream);
        let url = self.chat_completions_url(request.model);

        tracing::debug!(provider = %self.name, model = request.model, stream, "chat completion request");

        let response = self
            .apply_auth_header(self.client.post(&url).json(&body), api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }
        Ok(response)
    }
}

fn response_format_json(format: &ResponseFormat) -> serde_json::Value {
    match format {
        ResponseFormat::JsonObject => serde_json::json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema { name, schema } => serde_json::json!({
            "type": "json_schema",
            "json_schema": { "name": name, "schema": schema, "strict": false }
        }),
    }
}

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

fn api_content(m: &ChatMessage) -> Option<ApiContent> {
    if m.images.is_empty() {
        return m.content.clone().map(ApiContent::Text);
    }
    let mut parts: Vec<ApiContentPart> = m
        .content
        .iter()
        .filter(|text| !text.is_empty())
        .map(|text| ApiContentPart::Text { text: text.clone() })
        .collect();
    parts.extend(m.images.iter().map(|url| ApiContentPart::ImageUrl {
        image_url: ApiImageUrl { url: url.clone() },
    }));
    Some(ApiContent::Parts(parts))
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for ApiMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role.clone(),
            content: api_content(m),
            tool_calls: if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: Some(tc.id.clone()),
                            kind: Some("function".to_string()),
                            function: Some(Function {
                                name: Some(tc.name.clone()),
                                arguments: Some(tc.arguments.clone()),
                            }),
                        })
                        .collect(),
                )
            },
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolSpec> for ApiTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: ApiToolFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    function: Option<Function>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Function {
    name: Option<String>,
    arguments: Option<String>,
}

fn convert_tool_calls(calls: Vec<ApiToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .filter_map(|tc| {
            let function = tc.function?;
            let name = function.name?;
            Some(ToolCall {
                id: tc.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name,
                arguments: function
                    .arguments
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| "{}".to_string()),
            })
        })
        .collect()
}

// ══════════════════════════════════════════════════════════
// SSE streaming types for OpenAI-compatible chat completions
// ══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct StreamChatResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<Function>,
}

/// Splits an SSE byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so a multi-byte character
/// split across network chunks is decoded intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the payloads of every line completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let Some(last_newline) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let tail = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, tail);
        complete
            .split(|b| *b == b'\n')
            .filter_map(sse_payload)
            .collect()
    }

    /// Payload of a final line that arrived without a trailing newline.
    pub(crate) fn finish(self) -> Option<String> {
        sse_payload(&self.buf)
    }
}

fn sse_payload(line: &[u8]) -> Option<String> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(e) => {
            tracing::debug!(error = %e, "skipping SSE line with invalid UTF-8");
            return None;
        }
    };
    let data = line.trim_end_matches('\r').strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

/// How far past the known calls a streamed tool call index may jump.
const MAX_TOOL_CALL_INDEX_GAP: usize = 64;

/// Accumulator for streaming tool call deltas.
#[derive(Default)]
struct ToolCallAccumulator {
    calls: Vec<(Option<String>, String, String)>, // (id, name, arguments)
}

impl ToolCallAccumulator {
    fn push_delta(&mut self, delta: &StreamToolCall) {
        let index = delta.index.unwrap_or(0);
        if index > self.calls.len() + MAX_TOOL_CALL_INDEX_GAP {
            tracing::warn!(
                index,
                known = self.calls.len(),
                "ignoring tool call delta with out-of-range index"
            );
            return;
        }

        while self.calls.len() <= index {
            self.calls.push((None, String::new(), String::new()));
        }

        if let Some(id) = &delta.id {
            self.calls[index].0 = Some(id.clone());
        }
        if let Some(func) = &delta.function {
            if let Some(name) = &func.name {
                self.calls[index].1.push_str(name);
            }
            if let Some(args) = &func.arguments {
                self.calls[index].2.push_str(args);
            }
        }
    }

    fn into_tool_calls(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .filter(|(_, name, _)| !name.is_empty())
            .map(|(id, name, arguments)| ToolCall {
                id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name,
                arguments: if arguments.is_empty() {
                    "{}".to_string()
                } else {
                    arguments
                },
            })
            .collect()
    }
}

fn apply_stream_payload(
    payload: &str,
    content: &mut String,
    tools: &mut ToolCallAccumulator,
    tx: &mpsc::UnboundedSender<String>,
) {
    let Ok(chunk) = serde_json::from_str::<StreamChatResponse>(payload) else {
        tracing::debug!("skipping unparseable SSE payload");
        return;
    };
    for choice in &chunk.choices {
        if let Some(delta) = &choice.delta.content {
            content.push_str(delta);
            let _ = tx.send(delta.clone());
        }
        if let Some(tool_calls) = &choice.delta.tool_calls {
            for tc in tool_calls {
                tools.push_delta(tc);
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
        let response = self.send(&request, false).await?;
        let chat_response: ApiChatResponse = response.json().await?;

        let usage = chat_response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No response from {}", self.name))?;

        Ok(ChatResponse {
            text: choice.message.content,
            tool_calls: convert_tool_calls(choice.message.tool_calls.unwrap_or_default()),
            usage,
        })
    }

    async fn stream_chat(
        &self,
        request: ChatRequest<'_>,
        tx: mpsc::UnboundedSender<String>,
    ) -> anyhow::Result<ChatResponse> {
        let response = self.send(&request, true).await?;

        let mut content = String::new();
        let mut tools = ToolCallAccumulator::default();
        let mut decoder = SseDecoder::default();
        let mut byte_stream = response.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk?;
            for payload in decoder.push(&bytes) {
                apply_stream_payload(&payload, &mut content, &mut tools, &tx);
            }
        }
        if let Some(payload) = decoder.finish() {
            apply_stream_payload(&payload, &mut content, &mut tools, &tx);
        }

        Ok(ChatResponse {
            text: if content.is_empty() { None } else { Some(content) },
            tool_calls: tools.into_tool_calls(),
            usage: None,
        })
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider(base_url: &str) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("test", base_url, Some("key"), AuthStyle::Bearer)
    }

    #[test]
    fn chat_completions_url_appends_path() {
        let p = make_provider("https://api.openai.com/v1/");
        assert_eq!(
            p.chat_completions_url("gpt-4o-mini"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_keeps_full_endpoint() {
        let p = make_provider("https://ark.example.com/api/coding/v3/chat/completions");
        assert_eq!(
            p.chat_completions_url("m"),
            "https://ark.example.com/api/coding/v3/chat/completions"
        );
    }

    #[test]
    fn azure_url_uses_deployment_and_api_version() {
        let p = OpenAiCompatibleProvider::azure(
            "https://rr-af.openai.azure.com/",
            Some("k"),
            "2024-10-21",
        );
        assert_eq!(
            p.chat_completions_url("gpt-5-mini"),
            "https://rr-af.openai.azure.com/openai/deployments/gpt-5-mini/chat/completions?api-version=2024-10-21"
        );
        assert_eq!(p.auth, AuthStyle::ApiKey);
    }

    #[test]
    fn missing_key_is_an_error_unless_local() {
        let remote = OpenAiCompatibleProvider::new("openai", "https://x", None, AuthStyle::Bearer);
        let err = remote.credential().unwrap_err();
        assert!(err.to_string().contains("API key not set"));

        let local = OpenAiCompatibleProvider::new(
            "ollama",
            "http://localhost:11434/v1",
            None,
            AuthStyle::None,
        );
        assert!(local.credential().unwrap().is_none());
    }

    #[test]
    fn request_body_includes_tools_and_schema() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let tools = vec![ToolSpec {
            name: "upper_case".into(),
            description: "Upper-case text".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }];
        let format = ResponseFormat::JsonSchema {
            name: "IntentResult".into(),
            schema: serde_json::json!({"type": "object"}),
        };
        let request = ChatRequest {
            messages: &messages,
            tools: Some(&tools),
            response_format: Some(&format),
            model: "gpt-4o-mini",
            temperature: 0.2,
            reasoning_effort: None,
        };

        let body = serde_json::to_value(OpenAiCompatibleProvider::build_request(&request, false))
            .unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["function"]["name"], "upper_case");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "IntentResult");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn request_body_omits_empty_tools() {
        let messages = vec![ChatMessage::user("hi")];
        let request = ChatRequest {
            messages: &messages,
            tools: Some(&[]),
            response_format: None,
            model: "m",
            temperature: 0.7,
            reasoning_effort: None,
        };
        let body = serde_json::to_value(OpenAiCompatibleProvider::build_request(&request, true))
            .unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("response_format").is_none());
        assert_eq!(body["temperature"], 0.7);
        assert!(body.get("reasoning_effort").is_none());
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn reasoning_effort_replaces_temperature() {
        let messages = vec![ChatMessage::user("think")];
        let request = ChatRequest {
            messages: &messages,
            tools: None,
            response_format: None,
            model: "gpt-5-mini",
            temperature: 0.7,
            reasoning_effort: Some(ReasoningEffort::Low),
        };
        let body = serde_json::to_value(OpenAiCompatibleProvider::build_request(&request, false))
            .unwrap();
        assert_eq!(body["reasoning_effort"], "low");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn images_serialize_as_content_parts() {
        let msg = ChatMessage::user("What is in this picture?").with_images(vec![
            "https://example.com/cat.jpg".into(),
            "data:image/png;base64,iVBORw0K".into(),
        ]);
        let json = serde_json::to_value(ApiMessage::from(&msg)).unwrap();
        let parts = json["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "What is in this picture?");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "https://example.com/cat.jpg");
        assert_eq!(parts[2]["image_url"]["url"], "data:image/png;base64,iVBORw0K");
    }

    #[test]
    fn assistant_tool_call_turn_serializes_function_shape() {
        let msg = ChatMessage::assistant_tool_calls(
            None,
            vec![ToolCall {
                id: "call_1".into(),
                name: "reverse".into(),
                arguments: r#"{"text":"abc"}"#.into(),
            }],
        );
        let json = serde_json::to_value(ApiMessage::from(&msg)).unwrap();
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "reverse");
    }

    #[test]
    fn convert_tool_calls_defaults_empty_arguments() {
        let calls = vec![ApiToolCall {
            id: Some("c1".into()),
            kind: Some("function".into()),
            function: Some(Function {
                name: Some("random_number".into()),
                arguments: Some(String::new()),
            }),
        }];
        let converted = convert_tool_calls(calls);
        assert_eq!(converted[0].arguments, "{}");
        assert_eq!(converted[0].id, "c1");
    }

    #[test]
    fn sse_decoder_keeps_incomplete_tail() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.push(b"data: {\"a\":1}\ndata: {\"b\"");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
        assert!(decoder.push(b":2}").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["{\"b\":2}".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn sse_decoder_skips_done_marker_and_carriage_returns() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.push(b"data: {\"a\":1}\r\n\r\ndata: [DONE]\r\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn sse_decoder_finish_returns_unterminated_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"z\":0}").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("{\"z\":0}"));
    }

    #[test]
    fn multibyte_character_split_across_chunks_survives() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = body.as_bytes();
        // Split right after the first byte of the two-byte 'é' (0xC3 0xA9).
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut content = String::new();
        let mut tools = ToolCallAccumulator::default();
        let mut decoder = SseDecoder::default();
        for chunk in [&bytes[..split], &bytes[split..]] {
            for payload in decoder.push(chunk) {
                apply_stream_payload(&payload, &mut content, &mut tools, &tx);
            }
        }

        assert_eq!(content, "caf\u{e9}");
        assert_eq!(rx.try_recv().unwrap(), "caf\u{e9}");
        assert!(!content.contains('\u{fffd}'));
    }

    #[test]
    fn tool_call_delta_with_absurd_index_is_ignored() {
        let mut tools = ToolCallAccumulator::default();
        tools.push_delta(&StreamToolCall {
            index: Some(1_000_000_000),
            id: Some("c1".into()),
            function: Some(Function {
                name: Some("upper_case".into()),
                arguments: None,
            }),
        });
        assert!(tools.calls.is_empty());

        tools.push_delta(&StreamToolCall {
            index: Some(1),
            id: Some("c2".into()),
            function: Some(Function {
                name: Some("reverse".into()),
                arguments: None,
            }),
        });
        let calls = tools.into_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "reverse");
    }

    #[test]
    fn stream_payloads_forward_deltas_and_accumulate_tool_calls() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut content = String::new();
        let mut tools = ToolCallAccumulator::default();

        apply_stream_payload(
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            &mut content,
            &mut tools,
            &tx,
        );
        apply_stream_payload(
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            &mut content,
            &mut tools,
            &tx,
        );
        apply_stream_payload(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"upper_","arguments":"{\"te"}}]}}]}"#,
            &mut content,
            &mut tools,
            &tx,
        );
        apply_stream_payload(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"case","arguments":"xt\":\"a\"}"}}]}}]}"#,
            &mut content,
            &mut tools,
            &tx,
        );

        assert_eq!(content, "Hello");
        assert_eq!(rx.try_recv().unwrap(), "Hel");
        assert_eq!(rx.try_recv().unwrap(), "lo");

        let calls = tools.into_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "upper_case");
        assert_eq!(calls[0].arguments, r#"{"text":"a"}"#);
    }
}
