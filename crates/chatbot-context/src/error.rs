//! Error types for context management

use thiserror::Error;

/// Context management error type
///
/// Only configuration problems and missing scopes surface as errors; the
/// optimizer degrades gracefully on malformed message data instead.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Invalid budget: {0}")]
    InvalidBudget(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;
