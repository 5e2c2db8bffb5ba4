//! LLM chat client
//!
//! TigerStyle: Explicit wire structs, OpenAI-compatible chat completions
//! with native function calling. The client does not retry; model-call
//! failures propagate to the caller.

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::message::{Message, ToolCallRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Whether the model may decide to call tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides
    Auto,
    /// Force a plain text answer
    None,
}

impl ToolChoice {
    /// Wire name of the choice
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
        }
    }
}

/// Model reply: text content plus zero or more tool calls
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Text content (may be empty when the model only calls tools)
    pub content: String,
    /// Requested tool calls, in model order
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Abstraction over a chat-completions model
///
/// Implemented by [`HttpChatClient`] in production and by scripted mocks in
/// tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Plain chat completion, returning the assistant text
    async fn chat(&self, messages: &[Message]) -> Result<String>;

    /// Chat completion with tool schemas exposed to the model
    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[Value],
        tool_choice: ToolChoice,
    ) -> Result<ChatResponse>;
}

// =============================================================================
// Wire types (OpenAI-compatible)
// =============================================================================

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    /// Arguments as a JSON string, per the chat-completions contract
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

fn to_wire_message(message: &Message) -> WireMessage {
    let tool_calls = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                call_type: "function",
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: Value::Object(call.arguments.clone()).to_string(),
                },
            })
            .collect()
    });

    WireMessage {
        role: message.role.as_str(),
        content: message.content.clone(),
        tool_call_id: message.tool_call_id.clone(),
        tool_calls,
    }
}

fn parse_arguments(raw: &str, tool: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(tool = %tool, value = %other, "tool-call arguments are not an object");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(tool = %tool, error = %e, "failed to parse tool-call arguments");
            Map::new()
        }
    }
}

// =============================================================================
// HTTP client
// =============================================================================

/// Chat client over an OpenAI-compatible HTTP endpoint
pub struct HttpChatClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl HttpChatClient {
    /// Create a client for the given endpoint
    pub fn new(config: LlmConfig) -> Result<Self> {
        assert!(config.timeout_secs > 0, "timeout must be positive");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::model_request(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Load configuration from the environment and build a client
    pub fn from_env() -> Result<Self> {
        Self::new(LlmConfig::from_env()?)
    }

    /// The configured model identifier
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// The detected provider
    pub fn provider(&self) -> crate::provider::Provider {
        self.config.provider
    }

    async fn request(
        &self,
        messages: &[Message],
        tools: Option<&[Value]>,
        tool_choice: Option<ToolChoice>,
    ) -> Result<ChatResponse> {
        let wire_messages: Vec<WireMessage> = messages.iter().map(to_wire_message).collect();
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: wire_messages,
            tools,
            tool_choice: tool_choice.map(|c| c.as_str()),
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.map(|t| t.len()).unwrap_or(0),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::model_request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ModelApiError {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::model_request(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(Error::EmptyCompletion)?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let arguments = parse_arguments(&call.function.arguments, &call.function.name);
                ToolCallRequest::new(call.id, call.function.name, arguments)
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn chat(&self, messages: &[Message]) -> Result<String> {
        let response = self.request(messages, None, None).await?;
        Ok(response.content)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[Value],
        tool_choice: ToolChoice,
    ) -> Result<ChatResponse> {
        if tools.is_empty() {
            let response = self.request(messages, None, None).await?;
            return Ok(response);
        }
        self.request(messages, Some(tools), Some(tool_choice)).await
    }
}
