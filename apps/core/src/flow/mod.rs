//! # Flow Module
//!
//! Turn-selection policies: given the conversation so far, decide who speaks
//! next, to whom, and why.
//!
//! ## Components
//! - `conversation_flow`: randomised heuristic decision tree (default)
//! - `director`: model-driven policy parsing a JSON decision

pub mod conversation_flow;
pub mod director;

pub use conversation_flow::ConversationFlow;
pub use director::LlmFlowDirector;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{ConversationEvent, TurnDecision};

/// Everything a policy may look at for one decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnContext {
    /// Most recent recorded turn, before the current one is recorded.
    pub last_event: Option<ConversationEvent>,
    /// Characters eligible to speak next.
    pub active_characters: Vec<String>,
    /// Who produced the message being reacted to.
    pub last_speaker: String,
    /// The message being reacted to.
    pub last_message: String,
    /// The last few recorded turns, oldest first.
    pub recent_history: Vec<ConversationEvent>,
}

/// A turn-selection policy.
#[async_trait]
pub trait TurnPolicy: Send + Sync + 'static {
    /// Called when the human participant has just spoken.
    fn note_user_interaction(&self) {}

    /// Chooses the next speaker. Errors make the orchestrator fall back.
    async fn next_turn(&self, context: TurnContext) -> Result<TurnDecision, AppError>;
}
