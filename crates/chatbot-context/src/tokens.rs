//! Token estimation

/// Approximate token count: one token per four characters.
///
/// Counts characters rather than bytes so multi-byte text is not inflated.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
