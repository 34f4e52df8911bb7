//! Thinking-block removal for assistant output

/// Marker closing a model reasoning segment.
pub const THINK_CLOSE: &str = "</think>";
/// Marker opening a model reasoning segment.
pub const THINK_OPEN: &str = "<think>";

/// Remove the reasoning prefix from an assistant message.
///
/// Text without a closing marker is returned unchanged. Otherwise everything
/// up to and including the last closing marker is discarded and the remainder
/// is trimmed, which keeps the operation idempotent.
pub fn strip_thinking(text: &str) -> &str {
    match text.rfind(THINK_CLOSE) {
        Some(idx) => text[idx + THINK_CLOSE.len()..].trim(),
        None => text,
    }
}

/// True while a reasoning segment has been opened but not yet closed.
pub fn is_thinking(text: &str) -> bool {
    text.contains(THINK_OPEN) && !text.contains(THINK_CLOSE)
}
