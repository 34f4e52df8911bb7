//! Runtime abstractions for inference providers.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod providers;

pub use providers::OllamaProvider;

/// One chat turn sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Generation options forwarded to the model runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tfs_z: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl ModelOptions {
    /// Overlay every option set in `other` on top of `self`.
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            temperature: other.temperature.or(self.temperature),
            mirostat: other.mirostat.or(self.mirostat),
            tfs_z: other.tfs_z.or(self.tfs_z),
            num_ctx: other.num_ctx.or(self.num_ctx),
            num_predict: other.num_predict.or(self.num_predict),
            stop: if other.stop.is_empty() {
                self.stop.clone()
            } else {
                other.stop.clone()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub options: ModelOptions,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            options: ModelOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunk {
    Delta { text: String },
    Done,
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("mock provider has no queued response")]
    MockQueueEmpty,
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("provider error: {0}")]
    Message(String),
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;

    async fn chat_stream(&self, req: ChatRequest) -> Result<ProviderStream, ProviderError>;

    /// Load the model ahead of the first request.
    async fn preload(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockProvider {
    chat_queue: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    stream_queue: Mutex<VecDeque<Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_chat(&self, result: Result<ChatResponse, ProviderError>) {
        self.chat_queue
            .lock()
            .expect("mock chat queue poisoned")
            .push_back(result);
    }

    pub fn enqueue_stream(&self, result: Result<Vec<StreamChunk>, ProviderError>) {
        self.enqueue_stream_items(result.map(|chunks| chunks.into_iter().map(Ok).collect()));
    }

    /// Queue a stream whose items may fail part-way through.
    pub fn enqueue_stream_items(
        &self,
        result: Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>,
    ) {
        self.stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .push_back(result);
    }

    /// Queue a successful stream emitting `parts` as deltas followed by `Done`.
    pub fn enqueue_text(&self, parts: &[&str]) {
        let mut chunks: Vec<StreamChunk> = parts
            .iter()
            .map(|text| StreamChunk::Delta {
                text: (*text).to_string(),
            })
            .collect();
        chunks.push(StreamChunk::Done);
        self.enqueue_stream(Ok(chunks));
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .clone()
    }

    fn record(&self, req: ChatRequest) {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(req);
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-1"
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.record(req);
        self.chat_queue
            .lock()
            .expect("mock chat queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<ProviderStream, ProviderError> {
        self.record(req);
        let next = self
            .stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))?;

        Ok(Box::pin(stream::iter(next)))
    }
}
