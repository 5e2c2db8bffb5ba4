//! Core types for Engram agents
//!
//! TigerStyle: Small explicit surface shared by every other crate.
//!
//! - Chat [`message::Message`] types and FIFO-bounded [`message::History`]
//! - [`config::LlmConfig`] loaded from the environment, failing loud
//! - [`provider`] autodetection as a pure, enumerable function
//! - [`llm::ChatClient`] over the OpenAI-compatible chat-completions wire
//!   contract, with native function calling

pub mod config;
pub mod error;
pub mod llm;
pub mod message;
pub mod provider;

pub use config::LlmConfig;
pub use error::{Error, Result};
pub use llm::{ChatClient, ChatResponse, HttpChatClient, ToolChoice};
pub use message::{History, Message, Role, ToolCallRequest, ToolCallResult};
pub use provider::{detect_provider, EnvSnapshot, Provider};
