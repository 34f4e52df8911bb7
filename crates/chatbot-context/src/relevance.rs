//! Topic relevance scoring

use crate::topic::{keyword_patterns, Topic};

/// Relevance assumed when a topic has no keywords to compare against.
pub const NEUTRAL_RELEVANCE: f64 = 0.5;

/// Every message scores at least this much.
const RELEVANCE_FLOOR: f64 = 0.3;
/// Share of a topic's keywords that saturates relevance.
const SATURATION_SHARE: f64 = 0.3;

/// Score how relevant `text` is to `topic`, in `[0.3, 1.0]`.
///
/// Counts distinct keywords present at least once (whole-word match). Matching
/// about 30% of a topic's keyword set already saturates the score.
pub fn relevance(text: &str, topic: Topic) -> f64 {
    score_against(text, keyword_patterns(topic))
}

/// Score against a topic given by name; unknown names are neutral.
pub fn relevance_by_name(text: &str, topic: &str) -> f64 {
    topic
        .parse::<Topic>()
        .map_or(NEUTRAL_RELEVANCE, |topic| relevance(text, topic))
}

fn score_against(text: &str, patterns: &[regex::Regex]) -> f64 {
    if patterns.is_empty() {
        return NEUTRAL_RELEVANCE;
    }

    let text = text.to_lowercase();
    let matches = patterns.iter().filter(|re| re.is_match(&text)).count();
    let coverage = matches as f64 / (patterns.len() as f64 * SATURATION_SHARE);

    (RELEVANCE_FLOOR + (1.0 - RELEVANCE_FLOOR) * coverage.min(1.0)).min(1.0)
}
