//! Persisted history shape and statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::Message;
use crate::error::ContextResult;
use crate::tokens::estimate_tokens;
use crate::topic::TopicState;

/// Serialized history: the shared public scope plus one list per private user
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct HistoryFile {
    pub public: Vec<Message>,
    pub private: BTreeMap<String, Vec<Message>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHistoryFile {
    #[serde(default)]
    public: Vec<Value>,
    #[serde(default)]
    private: BTreeMap<String, Vec<Value>>,
}

impl HistoryFile {
    /// Parse a history file, silently dropping malformed message records.
    pub fn from_json(json: &str) -> ContextResult<Self> {
        let raw: RawHistoryFile = serde_json::from_str(json)?;

        let mut dropped = 0usize;
        let mut keep = |values: Vec<Value>| -> Vec<Message> {
            values
                .iter()
                .filter_map(|value| {
                    let message = Message::from_value(value);
                    if message.is_none() {
                        dropped += 1;
                    }
                    message
                })
                .collect()
        };

        let public = keep(raw.public);
        let private = raw
            .private
            .into_iter()
            .map(|(user, values)| (user, keep(values)))
            .collect();

        if dropped > 0 {
            debug!(dropped, "skipped malformed history records");
        }

        Ok(Self { public, private })
    }

    pub fn to_json(&self) -> ContextResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Summary of stored history
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryStats {
    pub public_messages: usize,
    pub public_tokens: usize,
    pub private_conversations: usize,
    pub private_messages: usize,
    pub private_tokens: usize,
    pub public_topic: TopicState,
}

impl HistoryStats {
    pub fn collect(history: &HistoryFile, public_topic: TopicState) -> Self {
        let tokens = |messages: &[Message]| -> usize {
            messages.iter().map(|m| estimate_tokens(&m.content)).sum()
        };

        Self {
            public_messages: history.public.len(),
            public_tokens: tokens(&history.public),
            private_conversations: history.private.len(),
            private_messages: history.private.values().map(Vec::len).sum(),
            private_tokens: history.private.values().map(|m| tokens(m)).sum(),
            public_topic,
        }
    }

    pub fn total_messages(&self) -> usize {
        self.public_messages + self.private_messages
    }

    pub fn total_tokens(&self) -> usize {
        self.public_tokens + self.private_tokens
    }
}
