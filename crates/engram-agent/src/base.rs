//! Base conversational agent
//!
//! TigerStyle: Minimal scaffolding shared by every agent variant — a name,
//! a chat client, a system prompt and FIFO-bounded history.

use crate::error::AgentResult;
use async_trait::async_trait;
use engram_core::llm::ChatClient;
use engram_core::message::{History, Message};
use std::sync::Arc;
use tracing::debug;

/// An agent turns a user utterance into a reply
#[async_trait]
pub trait Agent: Send {
    /// Agent name, for logging
    fn name(&self) -> &str;

    /// Process one user turn
    ///
    /// Not safe for concurrent invocation on one instance: history and
    /// memory write-back would interleave. Serve users from separate
    /// instances or serialize calls.
    async fn run(&mut self, input: &str) -> AgentResult<String>;

    /// Conversation history
    fn history(&self) -> &History;

    /// Drop the conversation history
    fn clear_history(&mut self);
}

/// History-only chat agent without tools or memory
pub struct SimpleAgent {
    name: String,
    client: Arc<dyn ChatClient>,
    system_prompt: Option<String>,
    history: History,
}

impl SimpleAgent {
    /// Create a simple agent
    pub fn new(name: impl Into<String>, client: Arc<dyn ChatClient>) -> Self {
        Self {
            name: name.into(),
            client,
            system_prompt: None,
            history: History::default(),
        }
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Bound the history length
    pub fn with_max_history(mut self, max_length: usize) -> Self {
        self.history = History::new(max_length);
        self
    }
}

#[async_trait]
impl Agent for SimpleAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, input: &str) -> AgentResult<String> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(self.history.messages().iter().cloned());
        messages.push(Message::user(input));

        debug!(agent = %self.name, messages = messages.len(), "Running simple agent turn");
        let response = self.client.chat(&messages).await?;

        self.history.push(Message::user(input));
        self.history.push(Message::assistant(response.clone()));
        Ok(response)
    }

    fn history(&self) -> &History {
        &self.history
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }
}
