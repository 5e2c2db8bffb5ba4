//! Chat messages and conversation history
//!
//! TigerStyle: Explicit message roles, FIFO-bounded history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default conversation history cap
pub const HISTORY_LENGTH_MAX_DEFAULT: usize = 40;

/// Message role in a chat conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// End-user input
    User,
    /// Model output
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the model
///
/// `id` is stable within one turn and correlates the tool result back to the
/// assistant message that requested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id (provider-issued in native mode, synthesized in text mode)
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments by parameter name
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Create a new request
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of executing one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Correlation id copied from the request
    pub id: String,
    /// Tool name copied from the request
    pub name: String,
    /// Tool output text (empty on failure)
    pub output: String,
    /// Error message (None on success)
    pub error: Option<String>,
    /// Whether execution succeeded
    pub success: bool,
}

impl ToolCallResult {
    /// Create a successful result
    pub fn ok(id: impl Into<String>, name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: output.into(),
            error: None,
            success: true,
        }
    }

    /// Create a failed result
    pub fn failed(id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: String::new(),
            error: Some(error.into()),
            success: false,
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Sender role
    pub role: Role,
    /// Text content
    pub content: String,
    /// For role=tool: id of the call this message answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For role=assistant: tool calls carried verbatim from the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with the given role and content
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message carrying the model's tool calls verbatim
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = Some(calls);
        msg
    }

    /// Create a tool-result message keyed by the originating call id
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }
}

/// Conversation history bounded to a maximum length
///
/// When the cap is exceeded the oldest entries are dropped (FIFO).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    messages: Vec<Message>,
    max_length: usize,
}

impl History {
    /// Create an empty history with the given cap
    pub fn new(max_length: usize) -> Self {
        assert!(max_length > 0, "history cap must be positive");
        Self {
            messages: Vec::new(),
            max_length,
        }
    }

    /// Append a message, dropping the oldest entries past the cap
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > self.max_length {
            let excess = self.messages.len() - self.max_length;
            self.messages.drain(..excess);
        }
    }

    /// All retained messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent `n` messages, oldest first
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all messages
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_LENGTH_MAX_DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::Tool.as_str(), "tool");
    }

    #[test]
    fn test_message_constructors() {
        let msg = Message::tool("call_1", "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn test_history_fifo_cap() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.push(Message::user(format!("m{}", i)));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[0].content, "m2");
        assert_eq!(history.messages()[2].content, "m4");
    }

    #[test]
    fn test_history_recent() {
        let mut history = History::new(10);
        for i in 0..4 {
            history.push(Message::user(format!("m{}", i)));
        }

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m2");
    }

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolCallResult::ok("id1", "calculator", "42");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ToolCallResult::failed("id2", "calculator", "boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.output.is_empty());
    }
}
