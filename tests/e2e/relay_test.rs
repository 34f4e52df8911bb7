//! End-to-end relay flows against scripted providers
//!
//! These tests drive public and private prompts through the relay with a
//! temporary data directory and check what reaches the model, what the user
//! sees, and what ends up on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatbot_context::{estimate_tokens, MessageRole, ScopeKey};
use chatbot_relay::commands::{execute, parse_command, AdminCommand, ReplCommand};
use chatbot_relay::settings::ContextSettingsUpdate;
use chatbot_relay::store::DataDir;
use chatbot_relay::stream::StreamOutcome;
use chatbot_relay::surface::RecordingSurface;
use chatbot_relay::{Relay, RelayConfig, RelayError, Reply};
use chatbot_runtime::{
    ChatRequest, ChatResponse, InferenceProvider, MockProvider, ProviderError, ProviderStream,
    StreamChunk,
};
use futures::stream::{self, StreamExt};
use tokio::sync::Notify;

fn temp_config(name: &str) -> (RelayConfig, PathBuf) {
    let dir = std::env::temp_dir().join(format!("chatbot-e2e-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = RelayConfig {
        data_dir: DataDir::new(&dir),
        ..RelayConfig::default()
    };
    (config, dir)
}

async fn open(config: &RelayConfig, provider: Arc<dyn InferenceProvider>) -> Relay {
    Relay::open(config, provider)
        .await
        .unwrap()
        .with_throttle(Duration::ZERO)
}

/// Provider whose stream blocks until released
struct GatedProvider {
    release: Arc<Notify>,
}

#[async_trait]
impl InferenceProvider for GatedProvider {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn default_model(&self) -> &str {
        "gated-1"
    }

    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::Message("not used".to_string()))
    }

    async fn chat_stream(&self, _req: ChatRequest) -> Result<ProviderStream, ProviderError> {
        let release = Arc::clone(&self.release);
        let first = stream::once(async move {
            release.notified().await;
            Ok(StreamChunk::Delta {
                text: "done waiting".to_string(),
            })
        });
        Ok(Box::pin(first.chain(stream::iter(vec![Ok(StreamChunk::Done)]))))
    }
}

#[tokio::test]
async fn session_state_survives_restart() {
    let (config, dir) = temp_config("restart");
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_text(&["Apply with the form in #apply."]);
    provider.enqueue_text(&["<think>they want points</think>", "You earn points from achievements."]);

    let relay = open(&config, provider.clone()).await;
    let mut surface = RecordingSurface::new();
    relay
        .handle_public("general", "alice", "how do I join the smp?", true, &mut surface)
        .await
        .unwrap();
    let reply = relay
        .handle_private("bob", "how do points work?", &mut surface)
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Answered(StreamOutcome::Completed(_))));
    assert_eq!(surface.last_text(), Some("You earn points from achievements."));
    drop(relay);

    let reopened = open(&config, Arc::new(MockProvider::new())).await;
    let public = reopened.manager().messages(&ScopeKey::Public).await.unwrap();
    assert_eq!(public.len(), 2);
    assert_eq!(public[1].role, MessageRole::Assistant);

    let private = reopened.manager().messages(&ScopeKey::private("bob")).await.unwrap();
    assert_eq!(private.len(), 2);
    assert!(private[0].content.contains("mode=private,name=bob"));

    let usage = reopened.usage().await;
    assert_eq!((usage.total, usage.public, usage.private), (2, 1, 1));
    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn second_prompt_fails_fast_while_generating() {
    let (config, dir) = temp_config("busy");
    let release = Arc::new(Notify::new());
    let provider = Arc::new(GatedProvider {
        release: Arc::clone(&release),
    });
    let relay = Arc::new(open(&config, provider).await);

    let first = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move {
            let mut surface = RecordingSurface::new();
            relay.handle_private("alice", "first", &mut surface).await
        })
    };
    for _ in 0..200 {
        if relay.gate().is_generating() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(relay.gate().is_generating());

    let mut surface = RecordingSurface::new();
    let err = relay
        .handle_public("general", "bob", "me too", true, &mut surface)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::AlreadyGenerating));
    assert_eq!(err.to_string(), "I'm already generating a response!");

    release.notify_one();
    let reply = first.await.unwrap().unwrap();
    assert_eq!(
        reply,
        Reply::Answered(StreamOutcome::Completed("done waiting".to_string()))
    );
    assert!(!relay.gate().is_generating());
    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn failed_edit_abandons_reply_without_recording_it() {
    let (config, dir) = temp_config("abandon");
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_text(&["partial", " answer"]);
    let relay = open(&config, provider).await;

    let mut surface = RecordingSurface::failing_after(0);
    let reply = relay
        .handle_private("carol", "tell me something", &mut surface)
        .await
        .unwrap();

    assert_eq!(
        reply,
        Reply::Answered(StreamOutcome::Abandoned {
            partial: "partial".to_string()
        })
    );
    let stored = relay.manager().messages(&ScopeKey::private("carol")).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, MessageRole::User);
    assert!(!relay.gate().is_generating());
    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn public_history_is_pruned_to_configured_budget() {
    let (config, dir) = temp_config("prune");
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_text(&["short reply"]);
    let relay = open(&config, provider.clone()).await;
    relay
        .update_context_settings(ContextSettingsUpdate {
            max_tokens: Some(500),
            ..ContextSettingsUpdate::default()
        })
        .await
        .unwrap();

    let mut surface = RecordingSurface::new();
    for i in 0..40 {
        let text = format!("message {i} {}", "filler text ".repeat(10));
        relay
            .handle_public("general", "dave", &text, false, &mut surface)
            .await
            .unwrap();
    }
    relay
        .handle_public("general", "dave", "summarize please", true, &mut surface)
        .await
        .unwrap();

    // the request itself used the wider per-call ceiling
    assert_eq!(provider.requests()[0].messages.len(), 42);

    let stored = relay.manager().messages(&ScopeKey::Public).await.unwrap();
    let tokens: usize = stored.iter().map(|m| estimate_tokens(&m.content)).sum();
    assert!(tokens <= 500);
    assert!(stored.len() < 42);
    assert_eq!(stored.last().unwrap().content, "short reply");
    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn admin_commands_from_chat_lines() {
    let (config, dir) = temp_config("admin");
    let relay = open(&config, Arc::new(MockProvider::new())).await;
    let mut surface = RecordingSurface::new();
    relay
        .handle_public("general", "erin", "the creeper blew up my minecraft house", false, &mut surface)
        .await
        .unwrap();

    let ReplCommand::Admin(stats) = parse_command("/stats") else {
        panic!("expected admin command");
    };
    let output = execute(&relay, stats).await.unwrap();
    assert!(output.contains("Public messages: 1"));
    assert!(output.contains("Current topic: minecraft"));

    let ReplCommand::Admin(style) = parse_command("/style optimized") else {
        panic!("expected admin command");
    };
    let output = execute(&relay, style).await.unwrap();
    assert!(output.contains("to 'optimized (terse)'"));

    let output = execute(&relay, AdminCommand::WipeMemory).await.unwrap();
    assert_eq!(output, "Memory wiped");
    assert_eq!(relay.history_stats().await.unwrap().total_messages(), 0);

    let ReplCommand::Admin(model) = parse_command("/model temperature=9") else {
        panic!("expected admin command");
    };
    let err = execute(&relay, model).await.unwrap_err();
    assert!(matches!(err, RelayError::InvalidArgument(_)));
    assert_eq!(relay.model_params().await.temperature, Some(0.75));
    std::fs::remove_dir_all(dir).ok();
}
