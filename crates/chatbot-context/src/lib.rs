//! Chatbot Context Management - topic-aware context optimization
//!
//! This crate provides:
//! - Keyword-based topic classification and relevance scoring
//! - Thinking-block removal and token estimation
//! - Budget-constrained context optimization
//! - Per-scope conversation management and history snapshots

pub mod context;
pub mod envelope;
pub mod error;
pub mod history;
pub mod manager;
pub mod optimizer;
pub mod relevance;
pub mod thinking;
pub mod tokens;
pub mod topic;
pub mod window;

pub use context::{Conversation, Message, MessageRole};
pub use envelope::{extract_payload, Envelope, Mode};
pub use error::{ContextError, ContextResult};
pub use history::{HistoryFile, HistoryStats};
pub use manager::{ConversationManager, ScopeKey};
pub use optimizer::{infer_topic, ContextOptimizer, OptimizerConfig, ScoredMessage};
pub use relevance::relevance;
pub use thinking::strip_thinking;
pub use tokens::estimate_tokens;
pub use topic::{classify, conversation_topics, Topic, TopicState};
pub use window::ContextWindow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::context::{Message, MessageRole};
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::manager::{ConversationManager, ScopeKey};
    pub use crate::optimizer::{ContextOptimizer, OptimizerConfig};
    pub use crate::topic::{Topic, TopicState};
    pub use crate::window::ContextWindow;
}
