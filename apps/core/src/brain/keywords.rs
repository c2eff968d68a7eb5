//! Keyword tables used by the conversation analyzer.
//!
//! All entries are lowercase and matched as raw substrings of the lowercased
//! message, so "show" also matches "how". False positives are acceptable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Markers whose presence makes a message count as a question.
pub const QUESTION_MARKERS: &[&str] = &[
    "?",
    "what",
    "how",
    "why",
    "where",
    "when",
    "who",
    "which",
    "could you",
    "would you",
    "will you",
    "can you",
    "do you",
];

const MYSTERY_KEYWORDS: &[&str] = &["journal", "key", "symbols", "passage", "chamber", "secret"];

const INVESTIGATION_KEYWORDS: &[&str] = &["found", "discovered", "search", "look", "examine"];

const SPECULATION_KEYWORDS: &[&str] = &["think", "believe", "suspect", "perhaps", "maybe"];

/// A topic family two messages can share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicCategory {
    Mystery,
    Investigation,
    Speculation,
}

impl TopicCategory {
    pub const ALL: [TopicCategory; 3] = [
        TopicCategory::Mystery,
        TopicCategory::Investigation,
        TopicCategory::Speculation,
    ];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            TopicCategory::Mystery => MYSTERY_KEYWORDS,
            TopicCategory::Investigation => INVESTIGATION_KEYWORDS,
            TopicCategory::Speculation => SPECULATION_KEYWORDS,
        }
    }

    /// Whether the already-lowercased text mentions any keyword of this category.
    pub fn mentioned_in(&self, lowercase_text: &str) -> bool {
        self.keywords().iter().any(|kw| lowercase_text.contains(kw))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TopicCategory::Mystery => "mystery",
            TopicCategory::Investigation => "investigation",
            TopicCategory::Speculation => "speculation",
        }
    }
}

impl fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_lowercase() {
        let all = QUESTION_MARKERS
            .iter()
            .chain(TopicCategory::ALL.iter().flat_map(|c| c.keywords().iter()));
        for word in all {
            assert_eq!(*word, word.to_lowercase(), "'{}' must be lowercase", word);
        }
    }

    #[test]
    fn test_category_matching() {
        assert!(TopicCategory::Mystery.mentioned_in("a secret door"));
        assert!(!TopicCategory::Mystery.mentioned_in("a wooden door"));
        assert!(TopicCategory::Speculation.mentioned_in("i suspect the butler"));
    }
}
