//! Benchmark harness comparing prompt, context, and sampling configurations

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chatbot_context::{classify, estimate_tokens, ContextOptimizer, Message, TopicState};
use chatbot_runtime::{ChatMessage, ChatRequest, InferenceProvider, ModelOptions, StreamChunk};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RelayResult;
use crate::prompts::{focused_prompt, PromptStyle};
use crate::store::{load_json, save_json};

/// Fixed prompts exercising different capabilities, keyed by prompt type.
pub const BENCHMARK_PROMPTS: [(&str, &str); 6] = [
    ("general", "Tell me what you know about artificial intelligence and its applications."),
    ("minecraft", "What are the best strategies for surviving the first night in Minecraft?"),
    ("discord", "How can I set up roles and permissions in my Discord server?"),
    ("factual", "What is the capital of France and what are some famous landmarks there?"),
    ("creative", "Write a short poem about a robot discovering emotions."),
    ("coding", "Explain how to write a basic function in Python that calculates factorial."),
];

pub fn benchmark_prompt(prompt_type: &str) -> Option<&'static str> {
    BENCHMARK_PROMPTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(prompt_type))
        .map(|(_, prompt)| *prompt)
}

/// Options shared by every benchmark run before per-config overrides.
pub fn standard_options() -> ModelOptions {
    ModelOptions {
        temperature: Some(0.7),
        num_predict: Some(200),
        stop: ["<end>", "<stop>", "User: ", "<|"].map(String::from).to_vec(),
        ..ModelOptions::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPromptKind {
    Default,
    Optimized,
    /// Focused on the prompt's own classified topic
    Focused,
}

impl SystemPromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Optimized => "optimized",
            Self::Focused => "focused",
        }
    }

    fn message(self, prompt: &str) -> Message {
        let text = match self {
            Self::Default => PromptStyle::Default.text(),
            Self::Optimized => PromptStyle::Optimized.text(),
            Self::Focused => focused_prompt(classify(prompt).0),
        };
        Message::system(text)
    }
}

/// One configuration under test
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub name: &'static str,
    pub system_prompt: SystemPromptKind,
    pub optimize_context: bool,
    pub temperature: f32,
    pub mirostat: f32,
}

impl BenchConfig {
    fn options(&self) -> ModelOptions {
        standard_options().merged(&ModelOptions {
            temperature: Some(self.temperature),
            mirostat: Some(self.mirostat),
            ..ModelOptions::default()
        })
    }
}

pub fn default_configs() -> Vec<BenchConfig> {
    let config = |name, system_prompt, optimize_context, temperature, mirostat| BenchConfig {
        name,
        system_prompt,
        optimize_context,
        temperature,
        mirostat,
    };
    vec![
        config("Default", SystemPromptKind::Default, false, 0.7, 0.0),
        config("Optimized", SystemPromptKind::Optimized, false, 0.7, 0.0),
        config("Topic-Focused", SystemPromptKind::Focused, false, 0.7, 0.0),
        config("Context-Optimized", SystemPromptKind::Optimized, true, 0.7, 0.0),
        config("Low Temperature", SystemPromptKind::Optimized, true, 0.3, 0.0),
        config("Mirostat Enabled", SystemPromptKind::Optimized, true, 0.7, 2.0),
    ]
}

/// Metrics from one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkRecord {
    pub config_name: String,
    /// Seconds from request to end of stream
    pub generation_time: f64,
    /// Stream deltas received; a proxy for generated tokens
    pub chunks_generated: usize,
    pub chunks_per_second: f64,
    /// Estimated tokens sent as context
    pub context_size: usize,
    pub prompt_type: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Speed,
    Detail,
}

fn by_speed(a: &BenchmarkRecord, b: &BenchmarkRecord) -> Ordering {
    a.chunks_per_second.total_cmp(&b.chunks_per_second)
}

fn by_detail(a: &BenchmarkRecord, b: &BenchmarkRecord) -> Ordering {
    a.chunks_generated
        .cmp(&b.chunks_generated)
        .then_with(|| by_speed(a, b))
}

/// Collected benchmark records
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BenchmarkResults {
    pub records: Vec<BenchmarkRecord>,
}

impl BenchmarkResults {
    pub fn push(&mut self, record: BenchmarkRecord) {
        self.records.push(record);
    }

    /// Name of the best configuration, or `None` without records.
    pub fn best_config(&self, priority: Priority) -> Option<&str> {
        let compare = match priority {
            Priority::Speed => by_speed,
            Priority::Detail => by_detail,
        };
        self.records
            .iter()
            .max_by(|a, b| compare(a, b))
            .map(|record| record.config_name.as_str())
    }

    pub fn summary(&self) -> String {
        if self.records.is_empty() {
            return "No benchmark results. Run some benchmarks first.".to_string();
        }

        let mut lines = vec![format!("Tested {} configurations", self.records.len())];
        if let Some(fastest) = self.records.iter().max_by(|a, b| by_speed(a, b)) {
            lines.push(format!(
                "Fastest: {} ({:.2} chunks/sec, {} chunks, {} prompt)",
                fastest.config_name,
                fastest.chunks_per_second,
                fastest.chunks_generated,
                fastest.prompt_type
            ));
        }
        if let Some(detailed) = self.records.iter().max_by_key(|r| r.chunks_generated) {
            lines.push(format!(
                "Most detailed: {} ({} chunks, {:.2} chunks/sec, {} prompt)",
                detailed.config_name,
                detailed.chunks_generated,
                detailed.chunks_per_second,
                detailed.prompt_type
            ));
        }

        let mut sorted: Vec<&BenchmarkRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| by_speed(b, a));
        lines.push("All results (sorted by speed):".to_string());
        lines.extend(sorted.iter().map(|r| {
            format!(
                "  {}: {:.2} c/s, {} chunks, {:.2}s",
                r.config_name, r.chunks_per_second, r.chunks_generated, r.generation_time
            )
        }));
        lines.join("\n")
    }

    pub async fn save_to_file(&self, path: &Path) -> RelayResult<()> {
        save_json(path, self).await
    }

    pub async fn load_from_file(path: &Path) -> RelayResult<Option<Self>> {
        load_json(path).await
    }
}

/// Runs every configuration against one provider
pub struct Benchmarker {
    provider: Arc<dyn InferenceProvider>,
    configs: Vec<BenchConfig>,
}

impl Benchmarker {
    pub fn new(provider: Arc<dyn InferenceProvider>) -> Self {
        Self {
            provider,
            configs: default_configs(),
        }
    }

    pub fn configs(&self) -> &[BenchConfig] {
        &self.configs
    }

    /// Run one configuration and measure it.
    pub async fn run_one(
        &self,
        config: &BenchConfig,
        prompt: &str,
        history: &[Message],
    ) -> RelayResult<BenchmarkRecord> {
        let mut messages = vec![config.system_prompt.message(prompt)];
        if config.optimize_context {
            let mut topic = TopicState::default();
            messages.extend(ContextOptimizer::default().optimize_default(history, &mut topic));
        } else {
            messages.extend(history.iter().cloned());
        }
        messages.push(Message::user(format!("Benchmark: {prompt}")));

        let context_size = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        let request = ChatRequest::new(
            messages
                .into_iter()
                .map(|m| ChatMessage::new(m.role.as_str(), m.content))
                .collect(),
        )
        .with_options(config.options());

        let started = Instant::now();
        let mut stream = self.provider.chat_stream(request).await?;
        let mut chunks = 0usize;
        while let Some(item) = stream.next().await {
            match item? {
                StreamChunk::Delta { .. } => chunks += 1,
                StreamChunk::Done => break,
            }
        }
        let elapsed = started.elapsed().as_secs_f64();

        Ok(BenchmarkRecord {
            config_name: config.name.to_string(),
            generation_time: elapsed,
            chunks_generated: chunks,
            chunks_per_second: if elapsed > 0.0 { chunks as f64 / elapsed } else { 0.0 },
            context_size,
            prompt_type: config.system_prompt.as_str().to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Run all configurations concurrently; failed runs are logged and skipped.
    pub async fn compare(&self, prompt: &str, history: &[Message]) -> BenchmarkResults {
        info!(configs = self.configs.len(), "running benchmarks in parallel");
        let runs = self
            .configs
            .iter()
            .map(|config| self.run_one(config, prompt, history));

        let mut results = BenchmarkResults::default();
        for (config, outcome) in self.configs.iter().zip(join_all(runs).await) {
            match outcome {
                Ok(record) => results.push(record),
                Err(e) => warn!(config = config.name, error = %e, "benchmark run failed"),
            }
        }
        results
    }
}
