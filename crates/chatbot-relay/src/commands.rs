//! Chat-line parsing and admin commands

use std::collections::BTreeSet;
use std::str::FromStr;

use chatbot_context::{classify, conversation_topics, extract_payload, ScopeKey};

use crate::error::RelayResult;
use crate::prompts::PromptStyle;
use crate::relay::Relay;
use crate::settings::{describe_context, describe_model, ContextSettingsUpdate, ModelParamsUpdate};

pub const REPL_COMMANDS: &[&str] = &[
    "/help", "/post", "/dm", "/topic", "/stats", "/usage", "/save", "/wipe", "/model", "/context",
    "/style", "/bench", "exit", "quit",
];

/// Admin operation on the running relay
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    Help,
    HistoryStats,
    Usage,
    SaveHistory,
    WipeMemory,
    ModelParams(ModelParamsUpdate),
    ContextSettings(ContextSettingsUpdate),
    PromptStyle(PromptStyle),
}

/// One line typed into the chat REPL
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Public message mentioning the bot
    Mention(String),
    /// Public message that does not mention the bot
    Post(String),
    Private(String),
    Topic(String),
    Admin(AdminCommand),
    Bench(Option<String>),
    Exit,
    Empty,
    Unknown(String),
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("`{key}` expects true or false, got `{value}`")),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("`{key}` expects a number, got `{value}`"))
}

fn key_values(tail: &str) -> Result<Vec<(&str, &str)>, String> {
    tail.split_whitespace()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(key, value)| !key.is_empty() && !value.is_empty())
                .ok_or_else(|| format!("expected key=value, got `{pair}`"))
        })
        .collect()
}

pub fn parse_model_update(tail: &str) -> Result<ModelParamsUpdate, String> {
    let mut update = ModelParamsUpdate::default();
    for (key, value) in key_values(tail)? {
        match key {
            "temperature" => update.temperature = Some(parse_number(key, value)?),
            "context_size" => update.context_size = Some(parse_number(key, value)?),
            "predictable" => update.predictable = Some(parse_bool(key, value)?),
            "creative" => update.creative = Some(parse_bool(key, value)?),
            _ => return Err(format!("unknown model parameter `{key}`")),
        }
    }
    Ok(update)
}

pub fn parse_context_update(tail: &str) -> Result<ContextSettingsUpdate, String> {
    let mut update = ContextSettingsUpdate::default();
    for (key, value) in key_values(tail)? {
        match key {
            "max_tokens" => update.max_tokens = Some(parse_number(key, value)?),
            "remove_thinking" => update.remove_thinking = Some(parse_bool(key, value)?),
            "recency_weight" => update.recency_weight = Some(parse_number(key, value)?),
            "relevance_weight" => update.relevance_weight = Some(parse_number(key, value)?),
            _ => return Err(format!("unknown context setting `{key}`")),
        }
    }
    Ok(update)
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    if line == "exit" || line == "quit" {
        return ReplCommand::Exit;
    }
    if !line.starts_with('/') {
        return ReplCommand::Mention(line.to_string());
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let tail = parts.next().map(str::trim).unwrap_or_default();

    match command {
        "/help" => ReplCommand::Admin(AdminCommand::Help),
        "/stats" => ReplCommand::Admin(AdminCommand::HistoryStats),
        "/usage" => ReplCommand::Admin(AdminCommand::Usage),
        "/save" => ReplCommand::Admin(AdminCommand::SaveHistory),
        "/wipe" => ReplCommand::Admin(AdminCommand::WipeMemory),
        "/post" if !tail.is_empty() => ReplCommand::Post(tail.to_string()),
        "/post" => ReplCommand::Unknown("usage: /post <message>".to_string()),
        "/dm" if !tail.is_empty() => ReplCommand::Private(tail.to_string()),
        "/dm" => ReplCommand::Unknown("usage: /dm <message>".to_string()),
        "/topic" if !tail.is_empty() => ReplCommand::Topic(tail.to_string()),
        "/topic" => ReplCommand::Unknown("usage: /topic <text>".to_string()),
        "/bench" => ReplCommand::Bench((!tail.is_empty()).then(|| tail.to_string())),
        "/model" => match parse_model_update(tail) {
            Ok(update) => ReplCommand::Admin(AdminCommand::ModelParams(update)),
            Err(message) => ReplCommand::Unknown(message),
        },
        "/context" => match parse_context_update(tail) {
            Ok(update) => ReplCommand::Admin(AdminCommand::ContextSettings(update)),
            Err(message) => ReplCommand::Unknown(message),
        },
        "/style" => {
            let mut args = tail.split_whitespace();
            match args.next() {
                Some(style) => match PromptStyle::parse(style, args.next()) {
                    Ok(style) => ReplCommand::Admin(AdminCommand::PromptStyle(style)),
                    Err(e) => ReplCommand::Unknown(e.to_string()),
                },
                None => ReplCommand::Unknown("usage: /style <default|optimized|focused> [topic]".to_string()),
            }
        }
        _ => ReplCommand::Unknown(format!("unknown command: {line}")),
    }
}

pub fn help_text() -> String {
    [
        "Commands:",
        "  <message>                    Send a public message mentioning the bot",
        "  /post <message>              Send a public message without a mention",
        "  /dm <message>                Send a private prompt",
        "  /topic <text>                Classify text into a topic",
        "  /stats                       Show conversation history statistics",
        "  /usage                       Show prompt counters",
        "  /save                        Save message history now",
        "  /wipe                        Wipe all conversation memory",
        "  /model [key=value ...]       Show or set temperature, context_size, predictable, creative",
        "  /context [key=value ...]     Show or set max_tokens, remove_thinking, recency_weight, relevance_weight",
        "  /style <style> [topic]       Set prompt style: default, optimized, focused <minecraft|discord>",
        "  /bench [prompt_type]         Benchmark model configurations",
        "  /help                        Show this help",
        "  exit | quit                  Exit REPL",
    ]
    .join("\n")
}

pub fn complete_candidates(prefix: &str) -> BTreeSet<&'static str> {
    REPL_COMMANDS
        .iter()
        .copied()
        .filter(|command| command.starts_with(prefix))
        .collect()
}

/// Describe how a text classifies.
pub fn describe_topic(text: &str) -> String {
    let (topic, confidence) = classify(text);
    format!("Topic: {topic} (confidence: {confidence:.2})")
}

/// Run an admin command, returning the text to show.
pub async fn execute(relay: &Relay, command: AdminCommand) -> RelayResult<String> {
    match command {
        AdminCommand::Help => Ok(help_text()),
        AdminCommand::HistoryStats => {
            let stats = relay.history_stats().await?;
            let public = relay.manager().messages(&ScopeKey::Public).await?;
            let shares = conversation_topics(public.iter().map(|m| extract_payload(&m.content)));

            let mut lines = vec![
                format!("Public messages: {} (~{} tokens)", stats.public_messages, stats.public_tokens),
                format!(
                    "Private conversations: {} ({} messages, ~{} tokens)",
                    stats.private_conversations, stats.private_messages, stats.private_tokens
                ),
                format!("Total tokens: ~{}", stats.total_tokens()),
                format!(
                    "Current topic: {} (confidence: {:.2})",
                    stats.public_topic.current_topic, stats.public_topic.topic_confidence
                ),
            ];
            if !shares.is_empty() {
                lines.push("Topic distribution:".to_string());
                lines.extend(
                    shares
                        .iter()
                        .map(|(topic, share)| format!("  {topic}: {:.0}%", share * 100.0)),
                );
            }
            Ok(lines.join("\n"))
        }
        AdminCommand::Usage => Ok(relay.usage().await.describe()),
        AdminCommand::SaveHistory => {
            relay.save_history().await?;
            Ok(format!(
                "Message history saved to {}",
                relay.history_store().path().display()
            ))
        }
        AdminCommand::WipeMemory => {
            relay.wipe_memory().await?;
            Ok("Memory wiped".to_string())
        }
        AdminCommand::ModelParams(update) if update == ModelParamsUpdate::default() => {
            Ok(describe_model(&relay.model_params().await))
        }
        AdminCommand::ModelParams(update) => {
            let options = relay.set_model_params(update).await?;
            Ok(format!("Model parameters updated\n{}", describe_model(&options)))
        }
        AdminCommand::ContextSettings(update) if update.is_empty() => {
            Ok(describe_context(&relay.context_settings().await))
        }
        AdminCommand::ContextSettings(update) => {
            let config = relay.update_context_settings(update).await?;
            Ok(format!("Context settings updated\n{}", describe_context(&config)))
        }
        AdminCommand::PromptStyle(style) => {
            let previous = relay.set_prompt_style(style).await;
            Ok(format!(
                "Changed from '{previous}' to '{style}' style\nNew prompt length: {} characters",
                style.text().len()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot_context::Topic;

    #[test]
    fn plain_line_is_a_mention() {
        assert_eq!(
            parse_command("how do I get in?"),
            ReplCommand::Mention("how do I get in?".to_string())
        );
        assert_eq!(parse_command("   "), ReplCommand::Empty);
        assert_eq!(parse_command("quit"), ReplCommand::Exit);
    }

    #[test]
    fn parse_dm_requires_text() {
        assert_eq!(parse_command("/dm hi there"), ReplCommand::Private("hi there".to_string()));
        assert_eq!(
            parse_command("/dm"),
            ReplCommand::Unknown("usage: /dm <message>".to_string())
        );
    }

    #[test]
    fn parse_model_parameters() {
        let command = parse_command("/model temperature=0.5 context_size=2048 creative=yes");
        assert_eq!(
            command,
            ReplCommand::Admin(AdminCommand::ModelParams(ModelParamsUpdate {
                temperature: Some(0.5),
                context_size: Some(2048),
                predictable: None,
                creative: Some(true),
            }))
        );
        assert!(matches!(parse_command("/model temperature"), ReplCommand::Unknown(_)));
        assert!(matches!(parse_command("/model speed=3"), ReplCommand::Unknown(_)));
    }

    #[test]
    fn parse_context_settings() {
        let command = parse_command("/context max_tokens=2000 remove_thinking=off");
        assert_eq!(
            command,
            ReplCommand::Admin(AdminCommand::ContextSettings(ContextSettingsUpdate {
                max_tokens: Some(2000),
                remove_thinking: Some(false),
                ..ContextSettingsUpdate::default()
            }))
        );
        assert_eq!(
            parse_command("/context"),
            ReplCommand::Admin(AdminCommand::ContextSettings(ContextSettingsUpdate::default()))
        );
    }

    #[test]
    fn parse_style_and_bench() {
        assert_eq!(
            parse_command("/style focused minecraft"),
            ReplCommand::Admin(AdminCommand::PromptStyle(PromptStyle::Focused(Topic::Minecraft)))
        );
        assert!(matches!(parse_command("/style focused"), ReplCommand::Unknown(_)));
        assert_eq!(parse_command("/bench"), ReplCommand::Bench(None));
        assert_eq!(parse_command("/bench coding"), ReplCommand::Bench(Some("coding".to_string())));
    }

    #[test]
    fn complete_candidates_matches_prefix() {
        let candidates = complete_candidates("/s");
        assert!(candidates.contains("/stats"));
        assert!(candidates.contains("/save"));
        assert!(candidates.contains("/style"));
    }

    #[test]
    fn help_text_lists_admin_commands() {
        let help = help_text();
        for command in ["/dm <message>", "/stats", "/save", "/wipe", "/model", "/context", "/style", "/bench"] {
            assert!(help.contains(command), "help text missing `{command}`");
        }
    }

    #[test]
    fn topic_description() {
        assert_eq!(describe_topic("creeper in the nether"), "Topic: minecraft (confidence: 1.00)");
    }
}
