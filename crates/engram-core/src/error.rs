//! Error types for engram-core
//!
//! TigerStyle: Explicit error variants with context, using thiserror.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("missing configuration: {key}, {hint}")]
    MissingConfiguration { key: String, hint: String },

    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Model Call Errors
    // =========================================================================
    #[error("model request failed: {reason}")]
    ModelRequestFailed { reason: String },

    #[error("model API error {status}: {body}")]
    ModelApiError { status: u16, body: String },

    #[error("model returned no completion choices")]
    EmptyCompletion,

    // =========================================================================
    // Cancellation
    // =========================================================================
    #[error("operation cancelled")]
    Cancelled,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl Error {
    /// Create a missing-configuration error
    pub fn missing_configuration(key: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            key: key.into(),
            hint: hint.into(),
        }
    }

    /// Create a model-request error
    pub fn model_request(reason: impl Into<String>) -> Self {
        Self::ModelRequestFailed {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is retriable by the caller
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::ModelRequestFailed { .. } => true,
            Self::ModelApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed {
            reason: err.to_string(),
        }
    }
}
