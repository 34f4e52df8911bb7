//! Chatbot relay: conversation glue between a chat surface and a local model
//!
//! This crate provides:
//! - Public/private prompt handling with topic-aware context optimization
//! - A single-flight generation gate and a streaming reply consumer
//! - Settings, history, and usage persistence as JSON files
//! - Admin commands, a benchmark harness, and the `chatbot` command line

use std::path::PathBuf;
use std::sync::Arc;

use chatbot_context::{ContextWindow, ScopeKey};
use chatbot_runtime::{InferenceProvider, OllamaProvider};
use clap::{Parser, Subcommand};
use serde_json::json;

pub mod bench;
pub mod commands;
pub mod error;
pub mod gate;
pub mod prompts;
pub mod relay;
pub mod settings;
pub mod store;
pub mod stream;
pub mod surface;

pub use error::{RelayError, RelayResult};
pub use relay::{Relay, Reply};
pub use settings::RelayConfig;

use crate::bench::{benchmark_prompt, BenchmarkResults, Benchmarker, Priority, BENCHMARK_PROMPTS};
use crate::commands::{describe_topic, execute, AdminCommand};

pub fn crate_name() -> &'static str {
    "chatbot-relay"
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "chatbot",
    version,
    about = "Topic-aware chat bot backed by a local model",
    long_about = "Chat bot relay with topic-aware context optimization, talking to a locally hosted Ollama model"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Directory holding history and settings files")]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Ollama base URL (defaults to OLLAMA_HOST)")]
    pub host: Option<String>,
    #[arg(long, global = true, help = "Model name (defaults to CHATBOT_MODEL)")]
    pub model: Option<String>,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Interactive chat session (default)")]
    Chat {
        #[arg(long, default_value = "you", help = "Display name used for your messages")]
        user: String,
        #[arg(long, default_value = "general", help = "Channel name for public messages")]
        channel: String,
        #[arg(long, help = "Skip loading the model at startup")]
        no_preload: bool,
    },
    #[command(about = "Print the optimized context of a stored conversation as JSON")]
    Optimize {
        #[arg(long, help = "Private conversation user; the public scope when omitted")]
        user: Option<String>,
        #[arg(long, help = "Token ceiling (defaults to the configured max_tokens)")]
        max_tokens: Option<usize>,
        #[arg(long, help = "Maximum number of messages to keep")]
        max_messages: Option<usize>,
    },
    #[command(about = "Classify text into a topic")]
    Classify {
        #[arg(help = "Text to classify")]
        text: String,
    },
    #[command(about = "Show stored history statistics and usage counters")]
    Stats,
    #[command(about = "Benchmark model configurations")]
    Bench {
        #[arg(default_value = "general", help = "Prompt type: general, minecraft, discord, factual, creative, coding")]
        prompt_type: String,
        #[arg(long, help = "Custom prompt instead of a built-in one")]
        prompt: Option<String>,
    },
}

impl Cli {
    /// Relay configuration from the environment with flag overrides applied.
    pub fn relay_config(&self) -> RelayConfig {
        let mut config = RelayConfig::from_env();
        if let Some(dir) = &self.data_dir {
            config.data_dir = store::DataDir::new(dir);
        }
        config
    }

    pub fn provider(&self) -> RelayResult<Arc<dyn InferenceProvider>> {
        let mut provider = OllamaProvider::from_env()?;
        if self.host.is_some() || self.model.is_some() {
            let host = self
                .host
                .clone()
                .unwrap_or_else(|| provider.base_url().to_string());
            let model = self
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string());
            provider = OllamaProvider::new(host, model)?;
        }
        Ok(Arc::new(provider))
    }
}

/// Run a non-interactive command and return its output.
pub async fn run(cli: &Cli, command: Commands) -> RelayResult<String> {
    match command {
        Commands::Classify { text } => Ok(describe_topic(&text)),
        Commands::Chat { .. } => Err(RelayError::InvalidArgument(
            "chat is interactive and cannot run here".to_string(),
        )),
        Commands::Optimize {
            user,
            max_tokens,
            max_messages,
        } => {
            let relay = Relay::open(&cli.relay_config(), cli.provider()?).await?;
            let key = user.map_or(ScopeKey::Public, ScopeKey::Private);
            let mut window = ContextWindow::new(
                max_tokens.unwrap_or(relay.context_settings().await.max_tokens),
            );
            if let Some(max_messages) = max_messages {
                window = window.with_max_messages(max_messages)?;
            }

            let messages = relay.manager().optimized_context(&key, Some(window)).await?;
            let topic = relay.manager().topic(&key).await?;
            let output = json!({
                "scope": key.to_string(),
                "topic": topic,
                "messages": messages,
            });
            Ok(serde_json::to_string_pretty(&output)?)
        }
        Commands::Stats => {
            let relay = Relay::open(&cli.relay_config(), cli.provider()?).await?;
            let history = execute(&relay, AdminCommand::HistoryStats).await?;
            let usage = execute(&relay, AdminCommand::Usage).await?;
            Ok(format!("{history}\n{usage}"))
        }
        Commands::Bench {
            prompt_type,
            prompt,
        } => {
            let config = cli.relay_config();
            let provider = cli.provider()?;
            let relay = Relay::open(&config, Arc::clone(&provider)).await?;
            run_benchmark(&relay, provider, &config, &prompt_type, prompt.as_deref()).await
        }
    }
}

/// Benchmark every configuration against the public history and save the results.
pub async fn run_benchmark(
    relay: &Relay,
    provider: Arc<dyn InferenceProvider>,
    config: &RelayConfig,
    prompt_type: &str,
    custom_prompt: Option<&str>,
) -> RelayResult<String> {
    let prompt = match custom_prompt {
        Some(prompt) => prompt,
        None => benchmark_prompt(prompt_type).ok_or_else(|| {
            let names: Vec<&str> = BENCHMARK_PROMPTS.iter().map(|(name, _)| *name).collect();
            RelayError::InvalidArgument(format!(
                "unknown prompt type `{prompt_type}`, expected one of: {}",
                names.join(", ")
            ))
        })?,
    };

    let history = relay.manager().messages(&ScopeKey::Public).await?;
    let results: BenchmarkResults = Benchmarker::new(provider).compare(prompt, &history).await;
    results
        .save_to_file(&config.data_dir.benchmark_results())
        .await?;

    let mut output = results.summary();
    if let Some(best) = results.best_config(Priority::Speed) {
        output.push_str(&format!("\nRecommended for speed: {best}"));
    }
    if let Some(best) = results.best_config(Priority::Detail) {
        output.push_str(&format!("\nRecommended for detail: {best}"));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_optimize_command() {
        let cli = Cli::parse_from([
            "chatbot",
            "--data-dir",
            "/tmp/bot",
            "optimize",
            "--user",
            "alice",
            "--max-messages",
            "20",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/bot")));
        match cli.command {
            Some(Commands::Optimize {
                user,
                max_tokens,
                max_messages,
            }) => {
                assert_eq!(user.as_deref(), Some("alice"));
                assert_eq!(max_tokens, None);
                assert_eq!(max_messages, Some(20));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["chatbot"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_bench_defaults() {
        let cli = Cli::parse_from(["chatbot", "bench"]);
        match cli.command {
            Some(Commands::Bench { prompt_type, prompt }) => {
                assert_eq!(prompt_type, "general");
                assert_eq!(prompt, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn classify_runs_offline() {
        let cli = Cli::parse_from(["chatbot", "classify", "ban the spam bot from the discord server"]);
        let command = cli.command.clone().unwrap();
        let output = run(&cli, command).await.unwrap();
        assert!(output.starts_with("Topic: discord"));
    }

    #[tokio::test]
    async fn optimize_reads_history_from_data_dir() {
        let dir = std::env::temp_dir().join(format!("chatbot-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("message_history.json"),
            r#"{"public": [{"role": "user", "content": "hello"}, {"role": "assistant", "content": "<think>x</think>hi"}], "private": {}}"#,
        )
        .unwrap();

        let cli = Cli::parse_from(["chatbot", "--data-dir", dir.to_str().unwrap(), "optimize"]);
        let command = cli.command.clone().unwrap();
        let output = run(&cli, command).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["scope"], "public");
        assert_eq!(value["messages"][1]["content"], "hi");
        std::fs::remove_dir_all(dir).ok();
    }
}
