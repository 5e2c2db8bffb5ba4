//! Agent error types
//!
//! TigerStyle: Explicit error variants with context.

use crate::tool_loop::LoopStep;
use thiserror::Error;

/// Result type for agent operations
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Errors surfaced by agents
#[derive(Error, Debug)]
pub enum AgentError {
    /// Model-call failure; the loop does not retry, the caller decides
    #[error("model call failed: {0}")]
    Model(#[from] engram_core::Error),

    /// Cooperative cancellation between steps or calls
    #[error("tool loop cancelled after {steps_used} steps")]
    Cancelled {
        steps_used: usize,
        /// Steps completed before cancellation
        partial_trace: Vec<LoopStep>,
    },

    /// Memory subsystem failure that could not be degraded
    #[error("memory operation failed: {0}")]
    Memory(#[from] engram_memory::MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::Cancelled {
            steps_used: 2,
            partial_trace: Vec::new(),
        };
        assert!(err.to_string().contains("2 steps"));
    }
}
