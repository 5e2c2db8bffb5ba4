//! Shared test doubles for agent integration tests

use async_trait::async_trait;
use engram_core::llm::{ChatClient, ChatResponse, ToolChoice};
use engram_core::message::{Message, ToolCallRequest};
use engram_core::Result as CoreResult;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Scripted model: returns queued responses in order and records every
/// request for assertions.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<ChatResponse>>,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

/// One recorded model invocation
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_choice: Option<ToolChoice>,
    pub tool_count: usize,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(id: &str, name: &str, args: Value) -> ChatResponse {
        let arguments = args.as_object().cloned().unwrap_or_default();
        ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest::new(id, name, arguments)],
        }
    }

    async fn pop(&self) -> ChatResponse {
        let mut responses = self.responses.lock().await;
        responses.pop_front().expect("model script exhausted")
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, messages: &[Message]) -> CoreResult<String> {
        self.requests.lock().await.push(RecordedRequest {
            messages: messages.to_vec(),
            tool_choice: None,
            tool_count: 0,
        });
        Ok(self.pop().await.content)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[Value],
        tool_choice: ToolChoice,
    ) -> CoreResult<ChatResponse> {
        self.requests.lock().await.push(RecordedRequest {
            messages: messages.to_vec(),
            tool_choice: Some(tool_choice),
            tool_count: tools.len(),
        });
        Ok(self.pop().await)
    }
}
