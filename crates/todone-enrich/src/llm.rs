use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use todone_core::{CancelSignal, LlmConfig, TodoneError};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use todone_enrich::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response, possibly requesting tool calls.
    Assistant,
    /// Output of a tool the assistant asked for.
    Tool,
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier echoed back with the tool's result.
    pub call_id: String,
    /// Name of the requested tool.
    pub name: String,
    /// JSON-encoded arguments, verbatim from the model.
    pub arguments: String,
}

/// A message in a chat conversation with the model.
///
/// # Examples
///
/// ```
/// use todone_enrich::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("What should I work on?");
/// assert_eq!(msg.role, Role::User);
/// assert!(msg.tool_calls.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
    /// Calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For [`Role::Tool`] messages, the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// A plain assistant answer.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant message recording the tool calls it asked for.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::new(Role::Assistant, "")
        }
    }

    /// The result of running the tool call `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Function name.
    pub name: String,
    /// What the function does, shown to the model.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    /// A tool that takes no arguments.
    pub fn without_arguments(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false,
            }),
        }
    }
}

/// A strict JSON schema the answer must follow.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema name.
    pub name: String,
    /// Short description of the expected output.
    pub description: String,
    /// The JSON schema itself.
    pub schema: Value,
}

/// One call to the text generation capability.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Instructions placed ahead of the history.
    pub system_prompt: String,
    /// Conversation so far, oldest first.
    pub history: Vec<ChatMessage>,
    /// Functions the model may call.
    pub tools: Vec<ToolSpec>,
    /// When set, the answer must be JSON following this schema.
    pub response_format: Option<ResponseSchema>,
}

/// What the model produced: an answer, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateResponse {
    /// Text answer. Empty when the model only requested tool calls.
    pub answer: String,
    /// Requested tool calls, in the order the model listed them.
    pub tool_calls: Vec<ToolCall>,
}

/// Capability to generate text from a prompt and conversation history.
///
/// Shared by every enrichment worker, so implementations must be
/// `Send + Sync`. Implementations should stop promptly once `cancel` fires.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one generation request.
    async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancelSignal,
    ) -> Result<GenerateResponse, TodoneError>;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use todone_core::LlmConfig;
/// use todone_enrich::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4.1-mini");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmClient {
    /// Create a new client from configuration.
    ///
    /// The API key comes from `[llm] api_key`, or `OPENAI_API_KEY` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Config`] for an unsupported provider, or
    /// [`TodoneError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, TodoneError> {
        if !config.provider.eq_ignore_ascii_case("openai") {
            return Err(TodoneError::Config(format!(
                "unsupported llm provider `{}` (only OpenAI-compatible endpoints are supported)",
                config.provider
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TodoneError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.resolve_api_key(),
            config: config.clone(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Returns `true` if requests will carry a bearer token.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base_url}/v1/chat/completions")
    }

    async fn send(&self, body: Value) -> Result<GenerateResponse, TodoneError> {
        let mut request = self.client.post(self.endpoint());
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| TodoneError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(TodoneError::Llm(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| TodoneError::Llm(format!("failed to parse response: {e}")))?;

        parse_completion(&response_body)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancelSignal,
    ) -> Result<GenerateResponse, TodoneError> {
        let body = request_body(&self.config.model, request);
        debug!(
            model = %self.config.model,
            messages = request.history.len(),
            tools = request.tools.len(),
            "sending chat completion"
        );
        tokio::select! {
            res = self.send(body) => res,
            _ = cancel.cancelled() => Err(TodoneError::Cancelled),
        }
    }
}

/// Build the `/v1/chat/completions` request body.
fn request_body(model: &str, request: &GenerateRequest) -> Value {
    let mut messages = Vec::with_capacity(request.history.len() + 1);
    if !request.system_prompt.is_empty() {
        messages.push(json!({ "role": "system", "content": request.system_prompt }));
    }
    messages.extend(request.history.iter().map(wire_message));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": 0.1,
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
    }

    if let Some(format) = &request.response_format {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": format.name,
                "description": format.description,
                "schema": format.schema,
                "strict": true,
            },
        });
    }

    body
}

fn wire_message(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or_default(),
            "content": msg.content,
        }),
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.call_id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                Value::String(msg.content.clone())
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        role => json!({ "role": role, "content": msg.content }),
    }
}

/// Extract the answer and tool calls from a chat completion.
fn parse_completion(body: &Value) -> Result<GenerateResponse, TodoneError> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| TodoneError::Llm(format!("unexpected response structure: {body}")))?;

    let answer = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function");
            let name = function.and_then(|f| f.get("name")).and_then(Value::as_str);
            let call_id = call.get("id").and_then(Value::as_str);
            let (Some(name), Some(call_id)) = (name, call_id) else {
                return Err(TodoneError::Llm(format!("malformed tool call: {call}")));
            };
            let arguments = function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or("{}");
            tool_calls.push(ToolCall {
                call_id: call_id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            });
        }
    }

    Ok(GenerateResponse { answer, tool_calls })
}
