//! Streaming response consumer

use std::time::Duration;

use chatbot_context::strip_thinking;
use chatbot_context::thinking::is_thinking;
use chatbot_runtime::{ProviderError, ProviderStream, StreamChunk};
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::surface::{ResponseSurface, ResponseView};

/// Minimum spacing between edits of the visible reply.
pub const EDIT_THROTTLE: Duration = Duration::from_millis(250);

/// How a streamed generation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream finished; holds the raw response text.
    Completed(String),
    /// The reply could not be edited and the stream was dropped.
    Abandoned { partial: String },
    /// The provider failed mid-stream.
    Failed {
        partial: String,
        error: ProviderError,
    },
}

impl StreamOutcome {
    /// Raw text received before the stream ended.
    pub fn text(&self) -> &str {
        match self {
            Self::Completed(text) => text,
            Self::Abandoned { partial } | Self::Failed { partial, .. } => partial,
        }
    }
}

/// Accumulated state of one streamed reply
#[derive(Debug, Default)]
struct ReplyState {
    raw: String,
    dots: u8,
}

impl ReplyState {
    fn push(&mut self, text: &str) {
        self.raw.push_str(text);
    }

    fn view(&mut self) -> ResponseView {
        if is_thinking(&self.raw) {
            self.dots = (self.dots + 1) % 4;
            ResponseView::Thinking { dots: self.dots }
        } else {
            ResponseView::Text(strip_thinking(&self.raw).to_string())
        }
    }
}

/// Drive `stream` to completion, mirroring progress onto `surface`.
///
/// Edits are spaced at least `throttle` apart, with one final edit once the
/// stream ends. A failed edit drops the stream immediately.
pub async fn relay_stream(
    mut stream: ProviderStream,
    surface: &mut dyn ResponseSurface,
    throttle: Duration,
) -> StreamOutcome {
    let mut state = ReplyState::default();
    let mut last_edit = Instant::now();
    let mut view = ResponseView::Text(String::new());
    let mut chunks = 0usize;

    while let Some(item) = stream.next().await {
        match item {
            Ok(StreamChunk::Delta { text }) => {
                chunks += 1;
                state.push(&text);
                view = state.view();
                if last_edit.elapsed() >= throttle {
                    if let Err(e) = surface.show(&view).await {
                        warn!(error = %e, chunks, "reply edit failed, abandoning stream");
                        return StreamOutcome::Abandoned { partial: state.raw };
                    }
                    last_edit = Instant::now();
                }
            }
            Ok(StreamChunk::Done) => break,
            Err(error) => {
                warn!(error = %error, chunks, "stream failed");
                return StreamOutcome::Failed {
                    partial: state.raw,
                    error,
                };
            }
        }
    }

    if let Err(e) = surface.show(&view).await {
        warn!(error = %e, "final reply edit failed");
        return StreamOutcome::Abandoned { partial: state.raw };
    }
    debug!(chunks, len = state.raw.len(), "stream completed");
    StreamOutcome::Completed(state.raw)
}
