//! JSON file persistence for history, settings, and usage counters

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chatbot_context::{ConversationManager, HistoryFile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RelayError, RelayResult};

const HISTORY_FILE: &str = "message_history.json";
const CONTEXT_SETTINGS_FILE: &str = "context_settings.json";
const MODEL_SETTINGS_FILE: &str = "model_settings.json";
const STATS_FILE: &str = "stats.json";
const BENCHMARK_FILE: &str = "benchmark_results.json";

/// Directory holding every persisted file
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    pub fn context_settings(&self) -> PathBuf {
        self.root.join(CONTEXT_SETTINGS_FILE)
    }

    pub fn model_settings(&self) -> PathBuf {
        self.root.join(MODEL_SETTINGS_FILE)
    }

    pub fn stats(&self) -> PathBuf {
        self.root.join(STATS_FILE)
    }

    pub fn benchmark_results(&self) -> PathBuf {
        self.root.join(BENCHMARK_FILE)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> RelayError {
    RelayError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn read_optional(path: &Path) -> RelayResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Load a JSON document; missing or unparsable files yield `None`.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> RelayResult<Option<T>> {
    let Some(text) = read_optional(path).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable json file");
            Ok(None)
        }
    }
}

/// Write a JSON document, replacing the file atomically.
pub async fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> RelayResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json).await
}

async fn write_atomic(path: &Path, contents: String) -> RelayResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error(path, e))
}

/// Persistence for the public/private message history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load history; a missing or corrupted file yields empty history.
    pub async fn load(&self) -> RelayResult<HistoryFile> {
        let Some(text) = read_optional(&self.path).await? else {
            info!(path = %self.path.display(), "no history file found");
            return Ok(HistoryFile::default());
        };
        match HistoryFile::from_json(&text) {
            Ok(history) => {
                info!(
                    public = history.public.len(),
                    private = history.private.len(),
                    "loaded history"
                );
                Ok(history)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "history file corrupted, starting empty");
                Ok(HistoryFile::default())
            }
        }
    }

    pub async fn save(&self, history: &HistoryFile) -> RelayResult<()> {
        write_atomic(&self.path, history.to_json()?).await?;
        debug!(path = %self.path.display(), "saved history");
        Ok(())
    }
}

/// Usage counters shown in the bot's status text
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UsageStats {
    /// Public messages observed
    pub seen: u64,
    /// Prompts answered
    pub total: u64,
    pub public: u64,
    pub private: u64,
}

impl UsageStats {
    pub fn record_seen(&mut self) {
        self.seen += 1;
    }

    pub fn record_prompt(&mut self, private: bool) {
        self.total += 1;
        if private {
            self.private += 1;
        } else {
            self.public += 1;
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "Messages seen: {}\nPrompts: {}\nPublic: {}\nPrivate: {}",
            self.seen, self.total, self.public, self.private
        )
    }
}

/// Periodically save the full history snapshot.
pub fn spawn_autosave(
    manager: Arc<ConversationManager>,
    store: HistoryStore,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            info!("auto-saving message history");
            if let Err(e) = store.save(&manager.snapshot().await).await {
                warn!(error = %e, "auto-save failed");
            }
        }
    })
}
