//! Tool error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Result type for tool operations
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Errors that can occur during tool operations
#[derive(Error, Debug)]
pub enum ToolError {
    /// Tool not found in registry (dispatch failure)
    #[error("tool not found: {name}")]
    NotFound { name: String },

    /// Missing required parameter
    #[error("missing required parameter '{param}' for tool '{tool}'")]
    MissingParameter { tool: String, param: String },

    /// Tool execution failed (exception raised by the tool body)
    #[error("tool '{tool}' execution failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ToolError {
    /// Create an execution-failed error
    pub fn execution_failed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}
