//! Topic-aware context optimization
//!
//! Every message is scored by a weighted mix of recency and relevance to the
//! current conversation topic. The highest scoring messages are taken greedily
//! until the token budget is hit, and the survivors are returned in their
//! original chronological order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{Message, MessageRole};
use crate::envelope::extract_payload;
use crate::error::{ContextError, ContextResult};
use crate::relevance::relevance;
use crate::thinking::strip_thinking;
use crate::tokens::estimate_tokens;
use crate::topic::{classify, Topic, TopicState};
use crate::window::ContextWindow;

/// Score given to system messages so they outrank everything else.
pub const SYSTEM_SCORE: f64 = 5.0;

/// Number of recent user messages considered when inferring the topic.
pub const TOPIC_WINDOW: usize = 5;

/// Optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Default token ceiling when no explicit window is given
    pub max_tokens: usize,
    pub recency_weight: f64,
    pub relevance_weight: f64,
    /// Strip thinking blocks from assistant messages
    pub remove_thinking: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            recency_weight: 0.6,
            relevance_weight: 0.4,
            remove_thinking: true,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> ContextResult<()> {
        for (name, weight) in [
            ("recency_weight", self.recency_weight),
            ("relevance_weight", self.relevance_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ContextError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        Ok(())
    }

    pub fn window(&self) -> ContextWindow {
        ContextWindow::new(self.max_tokens)
    }
}

/// A message paired with its score for one optimization pass
#[derive(Debug, Clone, Copy)]
pub struct ScoredMessage<'a> {
    pub position: usize,
    pub score: f64,
    pub message: &'a Message,
}

/// Budget-constrained context selector
#[derive(Debug, Clone, Default)]
pub struct ContextOptimizer {
    config: OptimizerConfig,
}

impl ContextOptimizer {
    pub fn new(config: OptimizerConfig) -> ContextResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize `history` under the configured token ceiling.
    pub fn optimize_default(&self, history: &[Message], topic: &mut TopicState) -> Vec<Message> {
        self.optimize(history, &self.config.window(), topic)
    }

    /// Select the context to send to the model.
    ///
    /// Updates `topic` from the most recent user messages, then returns an
    /// order-preserving subsequence of `history` (with assistant thinking
    /// stripped when enabled) that fits `window`. A non-empty history always
    /// yields at least one message, even if it alone exceeds the budget.
    pub fn optimize(
        &self,
        history: &[Message],
        window: &ContextWindow,
        topic: &mut TopicState,
    ) -> Vec<Message> {
        if history.is_empty() {
            return Vec::new();
        }

        *topic = infer_topic(history);

        let scored = self.score_messages(history, topic.current_topic);
        let candidates = scored.len();

        let mut accepted: Vec<(usize, Message)> = Vec::new();
        let mut used_tokens = 0usize;

        for entry in scored {
            let content = match entry.message.role {
                MessageRole::Assistant if self.config.remove_thinking => {
                    strip_thinking(&entry.message.content)
                }
                _ => entry.message.content.as_str(),
            };
            let cost = estimate_tokens(content);

            if used_tokens + cost > window.max_tokens && !accepted.is_empty() {
                break;
            }

            accepted.push((entry.position, Message::new(entry.message.role, content)));
            used_tokens += cost;

            if window.message_limit_reached(accepted.len()) {
                break;
            }
        }

        accepted.sort_by_key(|(position, _)| *position);

        debug!(
            topic = %topic.current_topic,
            confidence = topic.topic_confidence,
            history = history.len(),
            candidates,
            kept = accepted.len(),
            tokens = used_tokens,
            max_tokens = window.max_tokens,
            "optimized context"
        );

        accepted.into_iter().map(|(_, message)| message).collect()
    }

    /// Score every non-empty message, highest first.
    ///
    /// The sort is stable: equal scores keep ascending original position.
    pub fn score_messages<'a>(&self, history: &'a [Message], topic: Topic) -> Vec<ScoredMessage<'a>> {
        let len = history.len() as f64;

        let mut scored: Vec<ScoredMessage<'a>> = history
            .iter()
            .enumerate()
            .filter(|(_, message)| !message.is_empty())
            .map(|(position, message)| {
                let score = if message.role == MessageRole::System {
                    SYSTEM_SCORE
                } else {
                    let recency = position as f64 / len;
                    let relevance = relevance(extract_payload(&message.content), topic);
                    recency * self.config.recency_weight + relevance * self.config.relevance_weight
                };
                ScoredMessage {
                    position,
                    score,
                    message,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored
    }
}

/// Infer the conversation topic from the latest user messages.
///
/// Up to [`TOPIC_WINDOW`] non-empty user payloads are classified, newest
/// first, and vote for their topic with their confidence. Ties go to the topic
/// seen first.
pub fn infer_topic(history: &[Message]) -> TopicState {
    let recent = history
        .iter()
        .rev()
        .filter(|message| message.role == MessageRole::User)
        .map(|message| extract_payload(&message.content))
        .filter(|payload| !payload.is_empty())
        .take(TOPIC_WINDOW);

    let mut votes: Vec<(Topic, f64)> = Vec::new();
    let mut total = 0.0;
    for payload in recent {
        let (topic, confidence) = classify(payload);
        match votes.iter_mut().find(|(t, _)| *t == topic) {
            Some((_, vote)) => *vote += confidence,
            None => votes.push((topic, confidence)),
        }
        total += confidence;
    }

    let winner = votes.iter().copied().reduce(|best, candidate| {
        if candidate.1 > best.1 {
            candidate
        } else {
            best
        }
    });

    match winner {
        Some((current_topic, vote)) if total > 0.0 => TopicState {
            current_topic,
            topic_confidence: vote / total,
        },
        _ => TopicState::no_signal(),
    }
}
