//! Error types shared by every retrieval-augmentation stage.

use std::fmt;
use thiserror::Error;

/// Result type for pipeline operations
pub type RagResult<T> = Result<T, RagError>;

/// Errors raised by stages, collaborators and the orchestrator.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or invalid credential, unsupported model name and similar.
    /// Raised before any network call is issued.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single retriever failed.
    #[error("Retrieval failed in '{retriever}': {message}")]
    Retrieval { retriever: String, message: String },

    #[error("Query transformation failed: {0}")]
    Transform(String),

    #[error("Filter generation failed: {0}")]
    FilterGeneration(String),

    /// The chat or scoring model call failed.
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding store error: {0}")]
    Store(String),

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn retrieval(retriever: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retrieval {
            retriever: retriever.into(),
            message: message.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn invalid_state_transition(from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        Self::InvalidStateTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    /// Whether the orchestrator may replace this failure with its fallback
    /// (identity transform, unfiltered search, empty retrieval) instead of
    /// failing the query.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Retrieval { .. }
                | Self::Transform(_)
                | Self::FilterGeneration(_)
                | Self::Embedding(_)
                | Self::Store(_)
                | Self::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Serialization(err.to_string())
    }
}
