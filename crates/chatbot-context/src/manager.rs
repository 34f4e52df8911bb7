//! Conversation manager implementation
//!
//! Each scope (the shared public conversation, or one private conversation per
//! user) sits behind its own mutex so appends and optimization passes on the
//! same scope are serialized while different scopes proceed independently.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::context::{Conversation, Message};
use crate::error::{ContextError, ContextResult};
use crate::history::{HistoryFile, HistoryStats};
use crate::optimizer::{ContextOptimizer, OptimizerConfig};
use crate::topic::TopicState;
use crate::window::ContextWindow;

/// Default cap on messages stored per private conversation.
pub const DEFAULT_PRIVATE_CAP: usize = 49;

/// Identifies a conversation scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Public,
    Private(String),
}

impl ScopeKey {
    pub fn private(user: impl Into<String>) -> Self {
        Self::Private(user.into())
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private(user) => write!(f, "private:{user}"),
        }
    }
}

type Scope = Arc<Mutex<Conversation>>;

/// Manager owning every conversation scope
pub struct ConversationManager {
    optimizer: RwLock<ContextOptimizer>,
    public: Scope,
    private: RwLock<HashMap<String, Scope>>,
    private_cap: usize,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new(ContextOptimizer::default())
    }
}

impl ConversationManager {
    pub fn new(optimizer: ContextOptimizer) -> Self {
        Self {
            optimizer: RwLock::new(optimizer),
            public: Arc::new(Mutex::new(Conversation::default())),
            private: RwLock::new(HashMap::new()),
            private_cap: DEFAULT_PRIVATE_CAP,
        }
    }

    pub fn with_private_cap(mut self, cap: usize) -> Self {
        self.private_cap = cap.max(1);
        self
    }

    pub async fn config(&self) -> OptimizerConfig {
        self.optimizer.read().await.config().clone()
    }

    /// Replace the optimizer configuration.
    pub async fn set_config(&self, config: OptimizerConfig) -> ContextResult<()> {
        let optimizer = ContextOptimizer::new(config)?;
        *self.optimizer.write().await = optimizer;
        Ok(())
    }

    async fn scope(&self, key: &ScopeKey) -> ContextResult<Scope> {
        match key {
            ScopeKey::Public => Ok(Arc::clone(&self.public)),
            ScopeKey::Private(user) => self
                .private
                .read()
                .await
                .get(user)
                .cloned()
                .ok_or_else(|| ContextError::NotFound(key.to_string())),
        }
    }

    async fn scope_or_create(&self, key: &ScopeKey) -> Scope {
        match key {
            ScopeKey::Public => Arc::clone(&self.public),
            ScopeKey::Private(user) => {
                if let Some(scope) = self.private.read().await.get(user) {
                    return Arc::clone(scope);
                }
                let mut private = self.private.write().await;
                Arc::clone(private.entry(user.clone()).or_default())
            }
        }
    }

    /// Append a message, creating private scopes on first use.
    ///
    /// Private scopes drop their oldest messages beyond the stored cap.
    /// Returns the number of messages stored in the scope afterwards.
    pub async fn append(&self, key: &ScopeKey, message: Message) -> usize {
        let scope = self.scope_or_create(key).await;
        let mut conversation = scope.lock().await;
        conversation.add_message(message);
        if matches!(key, ScopeKey::Private(_)) {
            let dropped = conversation.truncate_oldest(self.private_cap);
            if dropped > 0 {
                debug!(scope = %key, dropped, "private history over cap");
            }
        }
        conversation.messages.len()
    }

    /// Build the optimized context for a scope and refresh its topic.
    ///
    /// Without an explicit window the configured token ceiling applies.
    pub async fn optimized_context(
        &self,
        key: &ScopeKey,
        window: Option<ContextWindow>,
    ) -> ContextResult<Vec<Message>> {
        let optimizer = self.optimizer.read().await.clone();
        let window = window.unwrap_or_else(|| optimizer.config().window());
        window.validate()?;

        let scope = self.scope(key).await?;
        let mut conversation = scope.lock().await;
        let Conversation { messages, topic } = &mut *conversation;
        Ok(optimizer.optimize(messages, &window, topic))
    }

    /// Replace a scope's stored history with its optimized form.
    pub async fn prune(&self, key: &ScopeKey) -> ContextResult<usize> {
        let optimizer = self.optimizer.read().await.clone();
        let scope = self.scope(key).await?;
        let mut conversation = scope.lock().await;

        let before = conversation.messages.len();
        let Conversation { messages, topic } = &mut *conversation;
        let pruned = optimizer.optimize_default(messages, topic);
        conversation.messages = pruned;

        let after = conversation.messages.len();
        debug!(scope = %key, before, after, "pruned history");
        Ok(after)
    }

    pub async fn messages(&self, key: &ScopeKey) -> ContextResult<Vec<Message>> {
        let scope = self.scope(key).await?;
        let conversation = scope.lock().await;
        Ok(conversation.messages.clone())
    }

    pub async fn len(&self, key: &ScopeKey) -> usize {
        match self.scope(key).await {
            Ok(scope) => scope.lock().await.messages.len(),
            Err(_) => 0,
        }
    }

    /// Topic state from the scope's last optimization pass.
    pub async fn topic(&self, key: &ScopeKey) -> ContextResult<TopicState> {
        let scope = self.scope(key).await?;
        let conversation = scope.lock().await;
        Ok(conversation.topic)
    }

    /// Forget every conversation.
    pub async fn wipe(&self) {
        *self.public.lock().await = Conversation::default();
        self.private.write().await.clear();
        info!("wiped conversation memory");
    }

    pub async fn snapshot(&self) -> HistoryFile {
        let public = self.public.lock().await.messages.clone();

        let scopes: Vec<(String, Scope)> = self
            .private
            .read()
            .await
            .iter()
            .map(|(user, scope)| (user.clone(), Arc::clone(scope)))
            .collect();

        let mut private = BTreeMap::new();
        for (user, scope) in scopes {
            private.insert(user, scope.lock().await.messages.clone());
        }

        HistoryFile { public, private }
    }

    /// Replace all stored history with a loaded snapshot.
    pub async fn restore(&self, history: HistoryFile) {
        let HistoryFile { public, private } = history;
        info!(
            public = public.len(),
            private = private.len(),
            "restored history"
        );

        *self.public.lock().await = Conversation::new(public);
        let mut scopes = self.private.write().await;
        scopes.clear();
        for (user, messages) in private {
            scopes.insert(user, Arc::new(Mutex::new(Conversation::new(messages))));
        }
    }

    pub async fn stats(&self) -> HistoryStats {
        let topic = self.public.lock().await.topic;
        HistoryStats::collect(&self.snapshot().await, topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::Topic;

    #[tokio::test]
    async fn append_and_read_back() {
        let manager = ConversationManager::default();
        assert_eq!(manager.append(&ScopeKey::Public, Message::user("hello")).await, 1);

        let messages = manager.messages(&ScopeKey::Public).await.unwrap();
        assert_eq!(messages, vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn unknown_private_scope_is_not_found() {
        let manager = ConversationManager::default();
        let err = manager
            .optimized_context(&ScopeKey::private("ghost"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::NotFound(_)));
        assert_eq!(manager.len(&ScopeKey::private("ghost")).await, 0);
    }

    #[tokio::test]
    async fn private_cap_drops_oldest() {
        let manager = ConversationManager::default().with_private_cap(3);
        let key = ScopeKey::private("alice");
        for i in 0..5 {
            manager.append(&key, Message::user(format!("m{i}"))).await;
        }

        let messages = manager.messages(&key).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "m2");
    }

    #[tokio::test]
    async fn public_scope_is_not_capped() {
        let manager = ConversationManager::default().with_private_cap(2);
        for i in 0..5 {
            manager.append(&ScopeKey::Public, Message::user(format!("m{i}"))).await;
        }
        assert_eq!(manager.len(&ScopeKey::Public).await, 5);
    }

    #[tokio::test]
    async fn optimized_context_updates_topic() {
        let manager = ConversationManager::default();
        manager
            .append(&ScopeKey::Public, Message::user("how do I beat the nether in minecraft"))
            .await;

        let context = manager.optimized_context(&ScopeKey::Public, None).await.unwrap();
        assert_eq!(context.len(), 1);

        let topic = manager.topic(&ScopeKey::Public).await.unwrap();
        assert_eq!(topic.current_topic, Topic::Minecraft);
    }

    #[tokio::test]
    async fn explicit_window_is_validated() {
        let manager = ConversationManager::default();
        manager.append(&ScopeKey::Public, Message::user("hi")).await;
        let window = ContextWindow {
            max_tokens: 10,
            max_messages: Some(0),
        };
        let err = manager
            .optimized_context(&ScopeKey::Public, Some(window))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::InvalidBudget(_)));
    }

    #[tokio::test]
    async fn prune_applies_configured_budget() {
        let manager = ConversationManager::default();
        manager
            .set_config(OptimizerConfig {
                max_tokens: 20,
                ..OptimizerConfig::default()
            })
            .await
            .unwrap();
        for i in 0..6 {
            manager
                .append(&ScopeKey::Public, Message::user(format!("{i}{}", "x".repeat(39))))
                .await;
        }

        assert_eq!(manager.prune(&ScopeKey::Public).await.unwrap(), 2);
        let messages = manager.messages(&ScopeKey::Public).await.unwrap();
        assert!(messages[0].content.starts_with('4'));
        assert!(messages[1].content.starts_with('5'));
    }

    #[tokio::test]
    async fn set_config_rejects_invalid_weights() {
        let manager = ConversationManager::default();
        let result = manager
            .set_config(OptimizerConfig {
                recency_weight: f64::INFINITY,
                ..OptimizerConfig::default()
            })
            .await;
        assert!(result.is_err());
        assert!((manager.config().await.recency_weight - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn snapshot_restore_and_wipe() {
        let manager = ConversationManager::default();
        manager.append(&ScopeKey::Public, Message::user("pub")).await;
        manager.append(&ScopeKey::private("bob"), Message::user("dm")).await;

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.public.len(), 1);
        assert_eq!(snapshot.private["bob"].len(), 1);

        manager.wipe().await;
        assert_eq!(manager.stats().await.total_messages(), 0);

        manager.restore(snapshot.clone()).await;
        assert_eq!(manager.snapshot().await, snapshot);
        let stats = manager.stats().await;
        assert_eq!(stats.private_conversations, 1);
        assert_eq!(stats.total_messages(), 2);
    }

    #[tokio::test]
    async fn scopes_are_independent_under_concurrency() {
        let manager = Arc::new(ConversationManager::default());
        let mut handles = Vec::new();
        for user in ["a", "b", "c", "d"] {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                let key = ScopeKey::private(user);
                for i in 0..20 {
                    manager.append(&key, Message::user(format!("{user}{i}"))).await;
                    manager.optimized_context(&key, None).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.private.len(), 4);
        assert!(snapshot.private.values().all(|m| m.len() == 20));
    }
}
