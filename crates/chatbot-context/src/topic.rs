//! Keyword-based topic classification
//!
//! Topics are a closed set with static weighted keyword tables. The table is
//! enumerated in a fixed order (minecraft, discord, gaming, general), and the
//! first topic in that order wins any tie.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Confidence reported when no keyword matched at all.
pub const NO_SIGNAL_CONFIDENCE: f64 = 0.1;

/// Classifications at or below this confidence are ignored by
/// [`conversation_topics`].
pub const MIN_TOPIC_CONFIDENCE: f64 = 0.2;

/// Conversation topic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Minecraft,
    Discord,
    Gaming,
    #[default]
    General,
}

impl Topic {
    /// All topics in classification order.
    pub const ALL: [Self; 4] = [Self::Minecraft, Self::Discord, Self::Gaming, Self::General];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minecraft => "minecraft",
            Self::Discord => "discord",
            Self::Gaming => "gaming",
            Self::General => "general",
        }
    }

    pub fn definition(self) -> &'static TopicDefinition {
        &TOPICS[self as usize]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ContextError::UnknownTopic(s.to_string()))
    }
}

/// Static keyword table entry for one topic
#[derive(Debug, Clone, Copy)]
pub struct TopicDefinition {
    pub topic: Topic,
    pub weight: f64,
    pub keywords: &'static [&'static str],
}

/// Indexed by `Topic as usize`.
pub static TOPICS: [TopicDefinition; 4] = [
    TopicDefinition {
        topic: Topic::Minecraft,
        // Server-specific vocabulary counts for more.
        weight: 1.5,
        keywords: &[
            "minecraft", "block", "creeper", "crafting", "mining", "smp", "survival", "mob",
            "nether", "end", "achievements", "points", "spells", "abilities", "achievement smp",
            "dash", "heal", "grab", "bolt", "ender pearl", "fireball", "freeze", "lifesteal",
            "defense", "damage", "fall damage", "speed",
        ],
    },
    TopicDefinition {
        topic: Topic::Discord,
        weight: 1.0,
        keywords: &[
            "discord", "server", "channel", "message", "dm", "ping", "mention", "bot", "role",
            "voice", "chat", "emoji", "react", "notification", "command", "mute", "ban", "kick",
            "moderator", "admin", "permissions",
        ],
    },
    TopicDefinition {
        topic: Topic::Gaming,
        weight: 0.8,
        keywords: &[
            "game", "gaming", "player", "level", "quest", "character", "rpg", "fps", "mmo",
            "strategy", "build", "team", "play", "win", "lose", "match", "server", "client",
            "mod", "steam", "xbox", "playstation", "nintendo", "console", "pc",
        ],
    },
    TopicDefinition {
        topic: Topic::General,
        weight: 0.5,
        keywords: &[
            "help", "question", "how", "what", "when", "where", "who", "why", "thanks", "hello",
            "hi", "hey", "nice", "good", "bad", "cool", "awesome", "interesting", "amazing",
            "terrible", "awful", "great", "wonderful", "explain", "tell",
        ],
    },
];

/// Whole-word patterns per topic, same order as [`TOPICS`].
static PATTERNS: Lazy<Vec<Vec<Regex>>> = Lazy::new(|| {
    TOPICS
        .iter()
        .map(|def| {
            def.keywords
                .iter()
                .map(|kw| Regex::new(&format!(r"\b{}\b", regex::escape(kw))).unwrap())
                .collect()
        })
        .collect()
});

/// Compiled whole-word patterns for a topic's keywords.
pub(crate) fn keyword_patterns(topic: Topic) -> &'static [Regex] {
    &PATTERNS[topic as usize]
}

/// Classify free text into a topic with a confidence in `[0, 1]`.
///
/// Each topic scores the weighted count of whole-word keyword occurrences.
/// Text without any keyword hit is reported as `general` at
/// [`NO_SIGNAL_CONFIDENCE`].
pub fn classify(text: &str) -> (Topic, f64) {
    let text = text.to_lowercase();

    let scores: Vec<(Topic, f64)> = TOPICS
        .iter()
        .map(|def| {
            let hits: usize = keyword_patterns(def.topic)
                .iter()
                .map(|re| re.find_iter(&text).count())
                .sum();
            (def.topic, hits as f64 * def.weight)
        })
        .collect();

    let (best_topic, best_score) = scores
        .iter()
        .copied()
        .fold((Topic::General, 0.0_f64), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        });

    if best_score == 0.0 {
        return (Topic::General, NO_SIGNAL_CONFIDENCE);
    }

    let total: f64 = scores.iter().map(|(_, score)| score).sum();
    (best_topic, (best_score / total).min(1.0))
}

/// Topic shares across a set of texts.
///
/// Confident classifications (above [`MIN_TOPIC_CONFIDENCE`]) vote with their
/// confidence; the result is normalized to sum to one and ordered by first
/// appearance.
pub fn conversation_topics<'a, I>(texts: I) -> Vec<(Topic, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut weights: Vec<(Topic, f64)> = Vec::new();
    for text in texts {
        let (topic, confidence) = classify(text);
        if confidence <= MIN_TOPIC_CONFIDENCE {
            continue;
        }
        match weights.iter_mut().find(|(t, _)| *t == topic) {
            Some((_, weight)) => *weight += confidence,
            None => weights.push((topic, confidence)),
        }
    }

    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if total > 0.0 {
        for (_, weight) in &mut weights {
            *weight /= total;
        }
    }
    weights
}

/// Current topic of a conversation scope
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TopicState {
    pub current_topic: Topic,
    pub topic_confidence: f64,
}

impl Default for TopicState {
    fn default() -> Self {
        Self {
            current_topic: Topic::General,
            topic_confidence: 0.0,
        }
    }
}

impl TopicState {
    /// State used when no usable user message is available.
    pub fn no_signal() -> Self {
        Self {
            current_topic: Topic::General,
            topic_confidence: NO_SIGNAL_CONFIDENCE,
        }
    }
}
