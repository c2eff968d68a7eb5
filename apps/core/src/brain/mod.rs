//! # Brain Module
//!
//! Fast, non-LLM conversation heuristics.
//! Runs inline on every turn, so everything here is a plain substring scan.
//!
//! ## Components
//! - `keywords`: interrogative markers and topic keyword categories
//! - `analyzer`: question detection and same-topic detection

pub mod analyzer;
pub mod keywords;

pub use analyzer::ConversationAnalyzer;
pub use keywords::TopicCategory;
