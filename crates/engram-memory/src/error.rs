//! Memory error types
//!
//! TigerStyle: Explicit error variants with context, using thiserror.

use thiserror::Error;

/// Result type for memory operations
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Errors that can occur in the memory subsystem
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Vector store I/O failure
    #[error("vector store operation failed: {reason}")]
    VectorStoreFailed { reason: String },

    /// Graph store I/O failure
    #[error("graph store operation failed: {reason}")]
    GraphStoreFailed { reason: String },

    /// Embedding generation failure
    #[error("embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    /// Collection does not exist
    #[error("collection not found: {collection}")]
    CollectionNotFound { collection: String },

    /// Memory item does not exist
    #[error("memory item not found: {id}")]
    ItemNotFound { id: String },

    /// Entity does not exist in the graph
    #[error("entity not found: {id}")]
    EntityNotFound { id: String },

    /// Tier requested but not enabled
    #[error("memory tier not enabled: {tier}")]
    TierDisabled { tier: String },

    /// Configuration error (construction time, fail loud)
    #[error("invalid memory configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Serialization error
    #[error("serialization failed: {reason}")]
    SerializationFailed { reason: String },
}

impl MemoryError {
    /// Create a vector-store error
    pub fn vector_store(reason: impl Into<String>) -> Self {
        Self::VectorStoreFailed {
            reason: reason.into(),
        }
    }

    /// Create a graph-store error
    pub fn graph_store(reason: impl Into<String>) -> Self {
        Self::GraphStoreFailed {
            reason: reason.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed {
            reason: err.to_string(),
        }
    }
}
