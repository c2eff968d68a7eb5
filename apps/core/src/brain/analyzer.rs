//! Conversation Analyzer - stateless text heuristics used by the turn policy.

use super::keywords::{TopicCategory, QUESTION_MARKERS};

/// Question and topic heuristics. Holds no state; every method is an associated function.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConversationAnalyzer;

impl ConversationAnalyzer {
    /// True if the message contains "?" or any interrogative marker, case-insensitively.
    pub fn is_question(message: &str) -> bool {
        let lower = message.to_lowercase();
        QUESTION_MARKERS.iter().any(|marker| lower.contains(marker))
    }

    /// True if both messages mention a keyword from the same topic category.
    pub fn check_similar_topics(first: &str, second: &str) -> bool {
        Self::shared_topic(first, second).is_some()
    }

    /// The first topic category both messages mention, if any.
    pub fn shared_topic(first: &str, second: &str) -> Option<TopicCategory> {
        let first = first.to_lowercase();
        let second = second.to_lowercase();
        TopicCategory::ALL
            .into_iter()
            .find(|category| category.mentioned_in(&first) && category.mentioned_in(&second))
    }

    /// Topic categories a single message touches.
    pub fn topics(message: &str) -> Vec<TopicCategory> {
        let lower = message.to_lowercase();
        TopicCategory::ALL
            .into_iter()
            .filter(|category| category.mentioned_in(&lower))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_detection() {
        assert!(ConversationAnalyzer::is_question("Can you help me?"));
        assert!(ConversationAnalyzer::is_question("DO YOU remember the key"));
        assert!(ConversationAnalyzer::is_question("Tell me where it is."));
        assert!(!ConversationAnalyzer::is_question("I went to the store."));
        assert!(!ConversationAnalyzer::is_question(""));
    }

    #[test]
    fn test_question_detection_is_permissive() {
        // Substring matching: "show" contains "how".
        assert!(ConversationAnalyzer::is_question("Let me show you."));
    }

    #[test]
    fn test_similar_topics() {
        assert!(ConversationAnalyzer::check_similar_topics(
            "I found a journal",
            "Did you examine the journal?"
        ));
        assert!(!ConversationAnalyzer::check_similar_topics("hello", "goodbye"));
    }

    #[test]
    fn test_similar_topics_requires_same_category() {
        // Mystery in one, speculation in the other.
        assert!(!ConversationAnalyzer::check_similar_topics(
            "The chamber is sealed",
            "I believe you"
        ));
        assert_eq!(
            ConversationAnalyzer::shared_topic("Maybe it was him", "Perhaps not"),
            Some(TopicCategory::Speculation)
        );
    }

    #[test]
    fn test_topics_lists_every_category() {
        let topics = ConversationAnalyzer::topics("I think I found the secret passage");
        assert_eq!(
            topics,
            vec![
                TopicCategory::Mystery,
                TopicCategory::Investigation,
                TopicCategory::Speculation
            ]
        );
    }
}
