//! Relay error types

use chatbot_context::ContextError;
use chatbot_runtime::ProviderError;
use thiserror::Error;

/// Errors surfaced by the relay
///
/// The busy/loading variants render as the text shown to the chat user.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I'm already generating a response!")]
    AlreadyGenerating,
    #[error("Loading... Try again later.")]
    Loading,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("context error: {0}")]
    Context(#[from] ContextError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// True for fast-fail rejections that should be shown to the user as-is.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::AlreadyGenerating | Self::Loading)
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
