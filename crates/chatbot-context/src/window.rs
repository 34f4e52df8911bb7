//! Context window budget

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ContextResult};

/// Token and message ceiling for one optimization pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextWindow {
    /// Maximum estimated tokens in the optimized context
    pub max_tokens: usize,
    /// Optional cap on the number of kept messages
    pub max_messages: Option<usize>,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            max_messages: None,
        }
    }
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            max_messages: None,
        }
    }

    /// Add a message cap; a cap of zero is a configuration error.
    pub fn with_max_messages(self, max_messages: usize) -> ContextResult<Self> {
        if max_messages == 0 {
            return Err(ContextError::InvalidBudget(
                "max_messages must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_messages: Some(max_messages),
            ..self
        })
    }

    pub fn validate(&self) -> ContextResult<()> {
        match self.max_messages {
            Some(0) => Err(ContextError::InvalidBudget(
                "max_messages must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn message_limit_reached(&self, accepted: usize) -> bool {
        self.max_messages.is_some_and(|cap| accepted >= cap)
    }
}
