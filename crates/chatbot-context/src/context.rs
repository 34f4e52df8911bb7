//! Conversation context types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::topic::TopicState;

/// Message role
///
/// Roles other than the three known ones deserialize as [`MessageRole::Unknown`]
/// and pass through optimization untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    #[serde(other)]
    Unknown,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Unknown => "unknown",
        }
    }
}

/// Message in a conversation
///
/// Messages are never edited in place: optimization derives new messages
/// (for example with thinking blocks stripped) and leaves the originals alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Lenient conversion from a loosely-typed record.
    ///
    /// Returns `None` when `role` or `content` is missing or not a string.
    pub fn from_value(value: &Value) -> Option<Self> {
        let role = value.get("role")?.as_str()?;
        let content = value.get("content")?.as_str()?;
        let role = serde_json::from_value(Value::String(role.to_string())).ok()?;
        Some(Self::new(role, content))
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Conversation state for a single scope
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub topic: TopicState,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            topic: TopicState::default(),
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop the oldest messages until at most `cap` remain.
    pub fn truncate_oldest(&mut self, cap: usize) -> usize {
        let excess = self.messages.len().saturating_sub(cap);
        if excess > 0 {
            self.messages.drain(..excess);
        }
        excess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_accepts_well_formed_records() {
        let msg = Message::from_value(&json!({"role": "assistant", "content": "hi"})).unwrap();
        assert_eq!(msg, Message::assistant("hi"));
    }

    #[test]
    fn from_value_maps_unknown_roles_to_pass_through() {
        let msg = Message::from_value(&json!({"role": "tool", "content": "result"})).unwrap();
        assert_eq!(msg.role, MessageRole::Unknown);
        assert_eq!(msg.content, "result");
    }

    #[test]
    fn from_value_rejects_missing_fields() {
        assert!(Message::from_value(&json!({"content": "orphan"})).is_none());
        assert!(Message::from_value(&json!({"role": "user"})).is_none());
        assert!(Message::from_value(&json!({"role": "user", "content": 42})).is_none());
    }

    #[test]
    fn truncate_oldest_keeps_newest() {
        let mut conversation =
            Conversation::new((0..5).map(|i| Message::user(format!("m{i}"))).collect());
        assert_eq!(conversation.truncate_oldest(3), 2);
        assert_eq!(conversation.messages[0].content, "m2");
        assert_eq!(conversation.truncate_oldest(3), 0);
    }
}
