//! Message relay: turns chat events into optimized model requests

use std::sync::Arc;
use std::time::Duration;

use chatbot_context::{
    classify, ContextWindow, ConversationManager, Envelope, HistoryStats, Message, Mode,
    OptimizerConfig, ScopeKey,
};
use chatbot_runtime::{ChatMessage, ChatRequest, InferenceProvider, ModelOptions};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RelayResult;
use crate::gate::GenerationGate;
use crate::prompts::{select_prompt, PromptStyle};
use crate::settings::{ContextSettingsUpdate, ModelParamsUpdate, RelayConfig, Settings};
use crate::store::{load_json, save_json, DataDir, HistoryStore, UsageStats};
use crate::stream::{relay_stream, StreamOutcome, EDIT_THROTTLE};
use crate::surface::ResponseSurface;

/// Token ceiling for the context sent with a public prompt.
pub const PUBLIC_CONTEXT_TOKENS: usize = 75_000;
/// Private scopes at or above this size are optimized with a message cap.
pub const PRIVATE_CAP_THRESHOLD: usize = 30;
/// Message cap applied to large private scopes.
pub const PRIVATE_MAX_MESSAGES: usize = 20;

/// What happened to an incoming chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Recorded in history without prompting the model.
    Ignored,
    Answered(StreamOutcome),
}

/// Relay between the chat surface, the conversation store, and the model
pub struct Relay {
    manager: Arc<ConversationManager>,
    provider: Arc<dyn InferenceProvider>,
    gate: GenerationGate,
    settings: RwLock<Settings>,
    style: RwLock<PromptStyle>,
    usage: Mutex<UsageStats>,
    data_dir: DataDir,
    history: HistoryStore,
    bot_name: String,
    throttle: Duration,
}

impl Relay {
    pub fn new(
        config: &RelayConfig,
        provider: Arc<dyn InferenceProvider>,
        manager: Arc<ConversationManager>,
        settings: Settings,
    ) -> Self {
        Self {
            manager,
            provider,
            gate: GenerationGate::new(),
            settings: RwLock::new(settings),
            style: RwLock::new(PromptStyle::default()),
            usage: Mutex::new(UsageStats::default()),
            history: HistoryStore::new(config.data_dir.history()),
            data_dir: config.data_dir.clone(),
            bot_name: config.bot_name.clone(),
            throttle: EDIT_THROTTLE,
        }
    }

    /// Load settings, history, and usage counters from the data directory.
    pub async fn open(config: &RelayConfig, provider: Arc<dyn InferenceProvider>) -> RelayResult<Self> {
        let settings = Settings::load(&config.data_dir).await?;
        let manager = Arc::new(ConversationManager::default());
        manager.set_config(settings.context.clone()).await?;

        let relay = Self::new(config, provider, manager, settings);
        relay.manager.restore(relay.history.load().await?).await;
        if let Some(usage) = load_json::<UsageStats>(&config.data_dir.stats()).await? {
            *relay.usage.lock().await = usage;
        }
        Ok(relay)
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn manager(&self) -> &Arc<ConversationManager> {
        &self.manager
    }

    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn gate(&self) -> &GenerationGate {
        &self.gate
    }

    /// Load the model, rejecting prompts with `Loading` meanwhile.
    pub async fn preload(&self) -> RelayResult<()> {
        self.gate.set_preloading(true);
        info!(provider = self.provider.name(), model = self.provider.default_model(), "preloading model");
        let result = self.provider.preload().await;
        self.gate.set_preloading(false);
        result?;
        info!("model loaded");
        Ok(())
    }

    /// Handle a message posted in a public channel.
    ///
    /// Every message is recorded; only mentions prompt the model.
    pub async fn handle_public(
        &self,
        channel: &str,
        author: &str,
        text: &str,
        mentioned: bool,
        surface: &mut dyn ResponseSurface,
    ) -> RelayResult<Reply> {
        let envelope = Envelope::new(Mode::Public, author, text).render();
        self.manager.append(&ScopeKey::Public, Message::user(envelope)).await;
        self.usage.lock().await.record_seen();

        if !mentioned {
            debug!(channel, author, "not mentioned");
            return Ok(Reply::Ignored);
        }

        let _guard = self.gate.try_begin()?;
        let request_id = Uuid::new_v4();
        let (topic, confidence) = classify(text);
        info!(%request_id, channel, author, %topic, confidence, "public prompt");

        let context = self
            .manager
            .optimized_context(&ScopeKey::Public, Some(ContextWindow::new(PUBLIC_CONTEXT_TOKENS)))
            .await?;
        let system = select_prompt(*self.style.read().await, topic, confidence);
        self.record_prompt(false).await;

        let outcome = self.generate(request_id, system, context, surface).await?;
        if let StreamOutcome::Completed(response) = &outcome {
            self.manager
                .append(&ScopeKey::Public, Message::assistant(response.clone()))
                .await;
        }

        let kept = self.manager.prune(&ScopeKey::Public).await?;
        debug!(%request_id, kept, "public history pruned");
        self.persist_history().await;
        Ok(Reply::Answered(outcome))
    }

    /// Handle a private prompt from `user`.
    pub async fn handle_private(
        &self,
        user: &str,
        text: &str,
        surface: &mut dyn ResponseSurface,
    ) -> RelayResult<Reply> {
        let _guard = self.gate.try_begin()?;
        let request_id = Uuid::new_v4();
        let (topic, confidence) = classify(text);
        info!(%request_id, user, %topic, confidence, "private prompt");

        let key = ScopeKey::private(user);
        let envelope = Envelope::new(Mode::Private, user, text).render();
        let stored = self.manager.append(&key, Message::user(envelope)).await;

        let window = if stored >= PRIVATE_CAP_THRESHOLD {
            Some(
                self.manager
                    .config()
                    .await
                    .window()
                    .with_max_messages(PRIVATE_MAX_MESSAGES)?,
            )
        } else {
            None
        };
        let context = self.manager.optimized_context(&key, window).await?;
        let system = select_prompt(*self.style.read().await, topic, confidence);
        self.record_prompt(true).await;

        let outcome = self.generate(request_id, system, context, surface).await?;
        if let StreamOutcome::Completed(response) = &outcome {
            self.manager.append(&key, Message::assistant(response.clone())).await;
        }

        self.persist_history().await;
        Ok(Reply::Answered(outcome))
    }

    async fn generate(
        &self,
        request_id: Uuid,
        system: Message,
        context: Vec<Message>,
        surface: &mut dyn ResponseSurface,
    ) -> RelayResult<StreamOutcome> {
        let messages: Vec<ChatMessage> = std::iter::once(system)
            .chain(context)
            .map(|message| ChatMessage::new(message.role.as_str(), message.content))
            .collect();
        let options = self.settings.read().await.model.clone();
        debug!(%request_id, messages = messages.len(), "sending chat request");

        let stream = self
            .provider
            .chat_stream(ChatRequest::new(messages).with_options(options))
            .await?;
        let outcome = relay_stream(stream, surface, self.throttle).await;
        match &outcome {
            StreamOutcome::Completed(text) => info!(%request_id, len = text.len(), "response complete"),
            StreamOutcome::Abandoned { .. } => warn!(%request_id, "response abandoned"),
            StreamOutcome::Failed { error, .. } => warn!(%request_id, %error, "response failed"),
        }
        Ok(outcome)
    }

    async fn record_prompt(&self, private: bool) {
        let usage = {
            let mut usage = self.usage.lock().await;
            usage.record_prompt(private);
            *usage
        };
        if let Err(e) = save_json(&self.data_dir.stats(), &usage).await {
            warn!(error = %e, "failed to save usage stats");
        }
    }

    async fn persist_history(&self) {
        if let Err(e) = self.save_history().await {
            warn!(error = %e, "failed to save history");
        }
    }

    pub async fn save_history(&self) -> RelayResult<()> {
        self.history.save(&self.manager.snapshot().await).await
    }

    /// Forget all conversations and persist the empty history.
    pub async fn wipe_memory(&self) -> RelayResult<()> {
        self.manager.wipe().await;
        self.save_history().await
    }

    /// History statistics with the public topic refreshed from current history.
    pub async fn history_stats(&self) -> RelayResult<HistoryStats> {
        self.manager.optimized_context(&ScopeKey::Public, None).await?;
        Ok(self.manager.stats().await)
    }

    pub async fn usage(&self) -> UsageStats {
        *self.usage.lock().await
    }

    pub async fn prompt_style(&self) -> PromptStyle {
        *self.style.read().await
    }

    /// Switch the system prompt style, returning the previous one.
    pub async fn set_prompt_style(&self, style: PromptStyle) -> PromptStyle {
        let previous = std::mem::replace(&mut *self.style.write().await, style);
        info!(%previous, current = %style, "prompt style changed");
        previous
    }

    pub async fn model_params(&self) -> ModelOptions {
        self.settings.read().await.model.clone()
    }

    pub async fn set_model_params(&self, update: ModelParamsUpdate) -> RelayResult<ModelOptions> {
        let mut settings = self.settings.write().await;
        update.apply(&mut settings.model)?;
        settings.save_model(&self.data_dir).await?;
        info!(model = ?settings.model, "model parameters updated");
        Ok(settings.model.clone())
    }

    pub async fn context_settings(&self) -> OptimizerConfig {
        self.settings.read().await.context.clone()
    }

    pub async fn update_context_settings(
        &self,
        update: ContextSettingsUpdate,
    ) -> RelayResult<OptimizerConfig> {
        let mut settings = self.settings.write().await;
        update.apply(&mut settings.context)?;
        self.manager.set_config(settings.context.clone()).await?;
        settings.save_context(&self.data_dir).await?;
        info!(context = ?settings.context, "context settings updated");
        Ok(settings.context.clone())
    }
}
