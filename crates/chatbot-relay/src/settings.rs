//! Bot configuration: environment, context settings, and model parameters

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chatbot_context::OptimizerConfig;
use chatbot_runtime::ModelOptions;
use tracing::info;

use crate::error::{RelayError, RelayResult};
use crate::store::{load_json, save_json, DataDir};

const DEFAULT_BOT_NAME: &str = "ChatBot V2";
const DEFAULT_AUTOSAVE_SECS: u64 = 300;

/// Process-level configuration read from the environment
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub data_dir: DataDir,
    pub bot_name: String,
    pub autosave_every: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            data_dir: DataDir::new("."),
            bot_name: DEFAULT_BOT_NAME.to_string(),
            autosave_every: Duration::from_secs(DEFAULT_AUTOSAVE_SECS),
        }
    }
}

impl RelayConfig {
    /// Read `CHATBOT_DATA_DIR`, `CHATBOT_NAME` and `CHATBOT_AUTOSAVE_SECS`.
    pub fn from_env() -> Self {
        let data_dir = env::var("CHATBOT_DATA_DIR").map_or_else(|_| PathBuf::from("."), PathBuf::from);
        let bot_name = env::var("CHATBOT_NAME").unwrap_or_else(|_| DEFAULT_BOT_NAME.to_string());
        let autosave_secs = env::var("CHATBOT_AUTOSAVE_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_AUTOSAVE_SECS);

        Self {
            data_dir: DataDir::new(data_dir),
            bot_name,
            autosave_every: Duration::from_secs(autosave_secs.max(1)),
        }
    }
}

/// Default generation parameters.
pub fn default_model_options() -> ModelOptions {
    ModelOptions {
        temperature: Some(0.75),
        mirostat: Some(2.0),
        tfs_z: Some(2.0),
        ..ModelOptions::default()
    }
}

/// Persisted optimizer and model settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub context: OptimizerConfig,
    pub model: ModelOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            context: OptimizerConfig::default(),
            model: default_model_options(),
        }
    }
}

impl Settings {
    /// Load settings, writing default context settings when none exist.
    pub async fn load(dir: &DataDir) -> RelayResult<Self> {
        let context = match load_json::<OptimizerConfig>(&dir.context_settings()).await? {
            Some(context) => {
                context.validate()?;
                info!(?context, "loaded context optimization settings");
                context
            }
            None => {
                let context = OptimizerConfig::default();
                save_json(&dir.context_settings(), &context).await?;
                info!("no context optimization settings found, using defaults");
                context
            }
        };

        let model = match load_json::<ModelOptions>(&dir.model_settings()).await? {
            Some(loaded) => {
                let model = default_model_options().merged(&loaded);
                info!(?model, "loaded model parameters");
                model
            }
            None => default_model_options(),
        };

        Ok(Self { context, model })
    }

    pub async fn save_context(&self, dir: &DataDir) -> RelayResult<()> {
        save_json(&dir.context_settings(), &self.context).await
    }

    pub async fn save_model(&self, dir: &DataDir) -> RelayResult<()> {
        save_json(&dir.model_settings(), &self.model).await
    }
}

/// Admin update to the generation parameters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelParamsUpdate {
    pub temperature: Option<f32>,
    pub context_size: Option<u32>,
    pub predictable: Option<bool>,
    pub creative: Option<bool>,
}

impl ModelParamsUpdate {
    /// Validate and apply; nothing changes if any value is out of range.
    pub fn apply(&self, options: &mut ModelOptions) -> RelayResult<()> {
        if let Some(temperature) = self.temperature {
            if !(0.1..=2.0).contains(&temperature) {
                return Err(RelayError::InvalidArgument(
                    "Temperature must be between 0.1 and 2.0".to_string(),
                ));
            }
        }
        if let Some(size) = self.context_size {
            if !(1000..=3000).contains(&size) {
                return Err(RelayError::InvalidArgument(
                    "Context size must be between 1000 and 3000".to_string(),
                ));
            }
        }

        if let Some(temperature) = self.temperature {
            options.temperature = Some(temperature);
        }
        if let Some(size) = self.context_size {
            options.num_ctx = Some(size);
        }
        if let Some(predictable) = self.predictable {
            options.mirostat = Some(if predictable { 2.0 } else { 0.0 });
        }
        match self.creative {
            Some(true) => {
                options.temperature = Some(0.9);
                options.mirostat = Some(0.0);
            }
            Some(false) => {
                options.temperature = Some(0.7);
                options.mirostat = Some(2.0);
            }
            None => {}
        }
        Ok(())
    }
}

/// Admin update to the context optimization settings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContextSettingsUpdate {
    pub max_tokens: Option<usize>,
    pub remove_thinking: Option<bool>,
    pub recency_weight: Option<f64>,
    pub relevance_weight: Option<f64>,
}

impl ContextSettingsUpdate {
    pub const MAX_TOKENS_RANGE: std::ops::RangeInclusive<usize> = 500..=200_000;

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validate and apply; nothing changes if any value is out of range.
    pub fn apply(&self, config: &mut OptimizerConfig) -> RelayResult<()> {
        if let Some(max_tokens) = self.max_tokens {
            if !Self::MAX_TOKENS_RANGE.contains(&max_tokens) {
                return Err(RelayError::InvalidArgument(format!(
                    "Max tokens must be between {} and {}",
                    Self::MAX_TOKENS_RANGE.start(),
                    Self::MAX_TOKENS_RANGE.end()
                )));
            }
        }
        for weight in [self.recency_weight, self.relevance_weight].into_iter().flatten() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(RelayError::InvalidArgument(
                    "Weights must be between 0 and 1".to_string(),
                ));
            }
        }

        let mut updated = config.clone();
        if let Some(max_tokens) = self.max_tokens {
            updated.max_tokens = max_tokens;
        }
        if let Some(remove_thinking) = self.remove_thinking {
            updated.remove_thinking = remove_thinking;
        }
        if let Some(weight) = self.recency_weight {
            updated.recency_weight = weight;
        }
        if let Some(weight) = self.relevance_weight {
            updated.relevance_weight = weight;
        }
        updated.validate()?;
        *config = updated;
        Ok(())
    }
}

/// Describe context settings for display.
pub fn describe_context(config: &OptimizerConfig) -> String {
    format!(
        "Max tokens: {}\nRemove thinking: {}\nRecency weight: {}\nRelevance weight: {}",
        config.max_tokens, config.remove_thinking, config.recency_weight, config.relevance_weight
    )
}

/// Describe model parameters for display.
pub fn describe_model(options: &ModelOptions) -> String {
    fn show<T: ToString>(value: Option<T>) -> String {
        value.map_or_else(|| "default".to_string(), |v| v.to_string())
    }
    format!(
        "Temperature: {}\nContext size: {}\nMirostat: {}\nTFS-Z: {}",
        show(options.temperature),
        show(options.num_ctx),
        show(options.mirostat),
        show(options.tfs_z)
    )
}
