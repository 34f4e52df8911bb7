//! Ollama API Provider
//!
//! Implements the InferenceProvider trait for a locally hosted Ollama server.
//! Streaming responses arrive as newline-delimited JSON objects.

use std::collections::VecDeque;
use std::env;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    ChatMessage, ChatRequest, ChatResponse, InferenceProvider, ModelOptions, ProviderError,
    ProviderStream, StreamChunk,
};

const OLLAMA_API_BASE: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "deepseek-r1:1.5b";
/// Keep the model resident indefinitely.
const KEEP_ALIVE_FOREVER: i64 = -1;

#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    /// Create a provider from `OLLAMA_HOST` and `CHATBOT_MODEL`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let base_url = env::var("OLLAMA_HOST").unwrap_or_else(|_| OLLAMA_API_BASE.to_string());
        let default_model = env::var("CHATBOT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(base_url, default_model)
    }

    pub fn new(
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        // No overall timeout: streamed generations can run for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            default_model: default_model.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn get_model(&self, req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn body<'a>(&self, req: &'a ChatRequest, stream: bool) -> ChatBody<'a> {
        ChatBody {
            model: self.get_model(req),
            messages: &req.messages,
            stream,
            options: &req.options,
            keep_alive: KEEP_ALIVE_FOREVER,
        }
    }

    async fn post(&self, body: &ChatBody<'_>) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

// ============================================================================
// Ollama API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: String,
    messages: &'a [ChatMessage],
    stream: bool,
    options: &'a ModelOptions,
    keep_alive: i64,
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

/// Turn one NDJSON line into zero, one or two stream items.
fn decode_line(line: &[u8], out: &mut VecDeque<Result<StreamChunk, ProviderError>>) {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<ChatLine>(line) {
        Ok(ChatLine {
            error: Some(error), ..
        }) => out.push_back(Err(ProviderError::Message(error))),
        Ok(parsed) => {
            if let Some(message) = parsed.message.filter(|m| !m.content.is_empty()) {
                out.push_back(Ok(StreamChunk::Delta {
                    text: message.content,
                }));
            }
            if parsed.done {
                out.push_back(Ok(StreamChunk::Done));
            }
        }
        Err(e) => out.push_back(Err(ProviderError::Decode(e.to_string()))),
    }
}

struct LineDecoder<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamChunk, ProviderError>>,
    exhausted: bool,
}

impl<S> LineDecoder<S> {
    fn drain_complete_lines(&mut self) {
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            decode_line(&line, &mut self.pending);
        }
    }
}

/// Decode a byte stream of NDJSON chat lines into stream chunks.
pub(crate) fn decode_ndjson<S, E>(inner: S) -> impl Stream<Item = Result<StreamChunk, ProviderError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let decoder = LineDecoder {
        inner,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(item) = decoder.pending.pop_front() {
                return Some((item, decoder));
            }
            if decoder.exhausted {
                return None;
            }
            match decoder.inner.next().await {
                Some(Ok(bytes)) => {
                    decoder.buffer.extend_from_slice(&bytes);
                    decoder.drain_complete_lines();
                }
                Some(Err(e)) => {
                    decoder.exhausted = true;
                    decoder
                        .pending
                        .push_back(Err(ProviderError::Transport(e.to_string())));
                }
                None => {
                    decoder.exhausted = true;
                    let rest = std::mem::take(&mut decoder.buffer);
                    decode_line(&rest, &mut decoder.pending);
                }
            }
        }
    })
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self.post(&self.body(&req, false)).await?;

        let parsed: ChatLine = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::Message(error));
        }

        Ok(ChatResponse {
            content: parsed.message.map(|m| m.content).unwrap_or_default(),
            model: parsed.model,
            finish_reason: parsed.done_reason,
        })
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<ProviderStream, ProviderError> {
        let response = self.post(&self.body(&req, true)).await?;
        let bytes = Box::pin(response.bytes_stream());
        Ok(Box::pin(decode_ndjson(bytes)))
    }

    async fn preload(&self) -> Result<(), ProviderError> {
        // An empty conversation loads the model without generating.
        let req = ChatRequest::new(Vec::new());
        self.post(&self.body(&req, false)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn network_tests_enabled() -> bool {
        matches!(std::env::var("CHATBOT_RUN_NETWORK_TESTS"), Ok(value) if value == "1")
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![
            ChatMessage::new("system", "be brief"),
            ChatMessage::new("user", "hello"),
        ])
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<Result<StreamChunk, ProviderError>> {
        let source = stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
        );
        decode_ndjson(source).collect().await
    }

    fn delta(text: &str) -> Result<StreamChunk, ProviderError> {
        Ok(StreamChunk::Delta {
            text: text.to_string(),
        })
    }

    #[test]
    fn provider_creation_explicit() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.default_model(), "llama3");
    }

    #[test]
    fn endpoint_building() {
        let provider = OllamaProvider::new("http://localhost:11434/", "llama3").unwrap();
        assert_eq!(provider.endpoint("/api/chat"), "http://localhost:11434/api/chat");
    }

    #[test]
    fn get_model_prefers_request_model() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3").unwrap();
        let mut req = request();
        assert_eq!(provider.get_model(&req), "llama3");
        req.model = Some("qwen".to_string());
        assert_eq!(provider.get_model(&req), "qwen");
    }

    #[tokio::test]
    async fn decodes_lines_split_across_chunks() {
        let items = collect(vec![
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"mess",
            "age\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}",
        ])
        .await;

        assert_eq!(
            items,
            vec![delta("Hel"), delta("lo"), Ok(StreamChunk::Done)]
        );
    }

    #[tokio::test]
    async fn decode_reports_server_errors_and_garbage() {
        let items = collect(vec!["{\"error\":\"model not found\"}\n", "not json\n"]).await;
        assert_eq!(
            items[0],
            Err(ProviderError::Message("model not found".to_string()))
        );
        assert!(matches!(items[1], Err(ProviderError::Decode(_))));
    }

    #[tokio::test]
    async fn decode_skips_blank_lines() {
        let items = collect(vec!["\n\n{\"message\":{\"content\":\"x\"},\"done\":true}\n\n"]).await;
        assert_eq!(items, vec![delta("x"), Ok(StreamChunk::Done)]);
    }

    #[tokio::test]
    async fn chat_calls_ollama_api() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set CHATBOT_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(200).json_body(json!({
                "model": "llama3",
                "message": {"role": "assistant", "content": "Hi there"},
                "done": true,
                "done_reason": "stop"
            }));
        });

        let provider = OllamaProvider::new(server.base_url(), "llama3").unwrap();
        let resp = provider.chat(request()).await.unwrap();

        mock.assert();
        assert_eq!(resp.content, "Hi there");
        assert_eq!(resp.model.as_deref(), Some("llama3"));
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn chat_stream_decodes_ndjson_body() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set CHATBOT_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(200).body(
                "{\"message\":{\"content\":\"<think>x</think>\"},\"done\":false}\n\
                 {\"message\":{\"content\":\"answer\"},\"done\":false}\n\
                 {\"message\":{\"content\":\"\"},\"done\":true}\n",
            );
        });

        let provider = OllamaProvider::new(server.base_url(), "llama3").unwrap();
        let items: Vec<_> = provider.chat_stream(request()).await.unwrap().collect().await;

        assert_eq!(
            items,
            vec![delta("<think>x</think>"), delta("answer"), Ok(StreamChunk::Done)]
        );
    }

    #[tokio::test]
    async fn chat_handles_api_error() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set CHATBOT_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(404).body("model 'missing' not found");
        });

        let provider = OllamaProvider::new(server.base_url(), "missing").unwrap();
        let err = provider.chat(request()).await.unwrap_err();

        match err {
            ProviderError::HttpStatus { status, .. } => assert_eq!(status, 404),
            _ => panic!("Expected HttpStatus error"),
        }
    }
}
