//! System prompt styles

use std::fmt;
use std::str::FromStr;

use chatbot_context::{Message, Topic};

use crate::error::RelayError;

/// Classifier confidence above which a topic-focused prompt is used.
pub const FOCUS_CONFIDENCE: f64 = 0.6;

const DEFAULT_PROMPT: &str = "You are a helpful assistant named ChatBot V2 inside a chat platform (Discord).
The server you're in is about a Minecraft server called the Achievement SMP. To get in it you have to apply by submitting a form.
In the achievement smp you gain points when you complete Minecraft achievements and you can use those to buy spells.";

const OPTIMIZED_PROMPT: &str = "You are ChatBot V2, a helpful and concise assistant on the Achievement SMP Discord server. Answer briefly.";

const MINECRAFT_FOCUS: &str = "Focus on Minecraft: gameplay, crafting, redstone, mobs, and the Achievement SMP, where players earn points for achievements and spend them on spells.";

const DISCORD_FOCUS: &str = "Focus on Discord: servers, channels, roles, permissions, and bots, including how to apply to the Achievement SMP.";

/// Style of system prompt placed ahead of the optimized history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptStyle {
    #[default]
    Default,
    Optimized,
    Focused(Topic),
}

impl PromptStyle {
    /// Build a style from its name and, for `focused`, a topic.
    pub fn parse(style: &str, topic: Option<&str>) -> Result<Self, RelayError> {
        match style.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "optimized" => Ok(Self::Optimized),
            "focused" => {
                let topic = topic
                    .and_then(|name| Topic::from_str(name).ok())
                    .filter(|topic| is_focusable(*topic))
                    .ok_or_else(|| {
                        RelayError::InvalidArgument(
                            "When using 'focused' style, please specify a valid topic: minecraft, discord"
                                .to_string(),
                        )
                    })?;
                Ok(Self::Focused(topic))
            }
            _ => Err(RelayError::InvalidArgument(
                "Invalid style. Use 'default', 'optimized', or 'focused'.".to_string(),
            )),
        }
    }

    pub fn text(self) -> String {
        match self {
            Self::Default => DEFAULT_PROMPT.to_string(),
            Self::Optimized => OPTIMIZED_PROMPT.to_string(),
            Self::Focused(topic) => focused_prompt(topic),
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default (comprehensive)"),
            Self::Optimized => f.write_str("optimized (terse)"),
            Self::Focused(topic) => write!(f, "focused on {topic}"),
        }
    }
}

fn is_focusable(topic: Topic) -> bool {
    matches!(topic, Topic::Minecraft | Topic::Discord)
}

/// Default prompt narrowed to one topic.
pub fn focused_prompt(topic: Topic) -> String {
    match topic {
        Topic::Minecraft => format!("{DEFAULT_PROMPT}\n{MINECRAFT_FOCUS}"),
        Topic::Discord => format!("{DEFAULT_PROMPT}\n{DISCORD_FOCUS}"),
        Topic::Gaming | Topic::General => DEFAULT_PROMPT.to_string(),
    }
}

/// System message for a prompt classified as `(topic, confidence)`.
pub fn select_prompt(style: PromptStyle, topic: Topic, confidence: f64) -> Message {
    if confidence > FOCUS_CONFIDENCE && is_focusable(topic) {
        Message::system(focused_prompt(topic))
    } else {
        Message::system(style.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_styles() {
        assert_eq!(PromptStyle::parse("Default", None).unwrap(), PromptStyle::Default);
        assert_eq!(PromptStyle::parse("optimized", None).unwrap(), PromptStyle::Optimized);
        assert_eq!(
            PromptStyle::parse("focused", Some("discord")).unwrap(),
            PromptStyle::Focused(Topic::Discord)
        );
        assert!(PromptStyle::parse("focused", Some("gaming")).is_err());
        assert!(PromptStyle::parse("focused", None).is_err());
        assert!(PromptStyle::parse("loud", None).is_err());
    }

    #[test]
    fn confident_minecraft_prompt_is_focused() {
        let message = select_prompt(PromptStyle::Optimized, Topic::Minecraft, 0.9);
        assert!(message.content.contains("Focus on Minecraft"));
    }

    #[test]
    fn weak_or_unfocusable_topic_keeps_style() {
        let message = select_prompt(PromptStyle::Optimized, Topic::Minecraft, 0.6);
        assert_eq!(message.content, OPTIMIZED_PROMPT);
        let message = select_prompt(PromptStyle::Default, Topic::Gaming, 1.0);
        assert_eq!(message.content, DEFAULT_PROMPT);
    }

    #[test]
    fn display_names() {
        assert_eq!(PromptStyle::Focused(Topic::Minecraft).to_string(), "focused on minecraft");
    }
}
