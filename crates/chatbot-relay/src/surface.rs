//! Places a streamed response is rendered to

use async_trait::async_trait;
use thiserror::Error;

/// What the user currently sees for an in-flight response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseView {
    /// Model is still inside its reasoning block; `dots` cycles 0..=3
    Thinking { dots: u8 },
    Text(String),
}

impl ResponseView {
    pub fn render(&self) -> String {
        match self {
            Self::Thinking { dots } => format!("Thinking{}", ".".repeat(usize::from(*dots))),
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("response message was deleted")]
    Gone,
    #[error("failed to edit response: {0}")]
    Edit(String),
}

/// An editable reply message
#[async_trait]
pub trait ResponseSurface: Send {
    /// Replace the visible reply with `view`.
    async fn show(&mut self, view: &ResponseView) -> Result<(), SurfaceError>;
}

/// Surface that keeps every rendered view, newest last
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub views: Vec<ResponseView>,
    fail_after: Option<usize>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every edit after `edits` successful ones.
    pub fn failing_after(edits: usize) -> Self {
        Self {
            views: Vec::new(),
            fail_after: Some(edits),
        }
    }

    pub fn last_text(&self) -> Option<&str> {
        self.views.iter().rev().find_map(|view| match view {
            ResponseView::Text(text) => Some(text.as_str()),
            ResponseView::Thinking { .. } => None,
        })
    }
}

#[async_trait]
impl ResponseSurface for RecordingSurface {
    async fn show(&mut self, view: &ResponseView) -> Result<(), SurfaceError> {
        if self.fail_after.is_some_and(|limit| self.views.len() >= limit) {
            return Err(SurfaceError::Gone);
        }
        self.views.push(view.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_renders_dots() {
        assert_eq!(ResponseView::Thinking { dots: 0 }.render(), "Thinking");
        assert_eq!(ResponseView::Thinking { dots: 3 }.render(), "Thinking...");
    }

    #[tokio::test]
    async fn recording_surface_fails_after_limit() {
        let mut surface = RecordingSurface::failing_after(1);
        surface.show(&ResponseView::Text("a".into())).await.unwrap();
        assert_eq!(
            surface.show(&ResponseView::Text("b".into())).await,
            Err(SurfaceError::Gone)
        );
        assert_eq!(surface.last_text(), Some("a"));
    }
}
