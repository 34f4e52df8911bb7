//! Tagged message envelope used by the relay
//!
//! User messages are stored wrapped with their delivery metadata:
//!
//! ```text
//! mode=public,name=Alice
//! <|user|>
//! [#general] how do I craft a bed?
//! <|end|>
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub const USER_TAG: &str = "<|user|>";
pub const END_TAG: &str = "<|end|>";

/// Delivery mode of an inbound message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Public,
    Private,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// A user payload together with its delivery metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub mode: Mode,
    pub name: &'a str,
    pub text: &'a str,
}

impl<'a> Envelope<'a> {
    pub fn new(mode: Mode, name: &'a str, text: &'a str) -> Self {
        Self { mode, name, text }
    }

    pub fn render(&self) -> String {
        format!(
            "mode={},name={}\n{USER_TAG}\n{}\n{END_TAG}",
            self.mode, self.name, self.text
        )
    }
}

/// Extract the user payload from enveloped content.
///
/// Both tags must be present; otherwise the whole content is the payload.
pub fn extract_payload(content: &str) -> &str {
    if !content.contains(USER_TAG) || !content.contains(END_TAG) {
        return content;
    }
    let Some(start) = content.find(USER_TAG) else {
        return content;
    };
    let rest = &content[start + USER_TAG.len()..];
    let rest = rest.find(USER_TAG).map_or(rest, |next| &rest[..next]);
    let inner = rest.find(END_TAG).map_or(rest, |end| &rest[..end]);
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_then_extract() {
        let envelope = Envelope::new(Mode::Public, "Alice", "[#general] hello there");
        let rendered = envelope.render();
        assert!(rendered.starts_with("mode=public,name=Alice\n<|user|>\n"));
        assert_eq!(extract_payload(&rendered), "[#general] hello there");
    }

    #[test]
    fn bare_tags_without_metadata() {
        assert_eq!(extract_payload("<|user|>\nhi bot\n<|end|>"), "hi bot");
    }

    #[test]
    fn missing_tag_falls_back_to_whole_content() {
        assert_eq!(extract_payload("<|user|>\nno end tag"), "<|user|>\nno end tag");
        assert_eq!(extract_payload("plain text"), "plain text");
        assert_eq!(extract_payload("only end <|end|>"), "only end <|end|>");
    }

    #[test]
    fn stops_at_a_second_opening_tag() {
        assert_eq!(
            extract_payload("<|user|> first <|user|> second <|end|>"),
            "first"
        );
    }
}
