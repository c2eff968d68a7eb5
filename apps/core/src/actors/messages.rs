use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::models::Thought;

/// Defines errors that can occur within the actor system.
#[derive(Debug, thiserror::Error, Serialize, Clone)]
pub enum ActorError {
    /// An error originating from the LLM actor.
    #[error("LLM request failed: {0}")]
    LlmError(String),
    /// A generic internal error within an actor.
    #[error("Internal system error: {0}")]
    Internal(String),
    /// An error indicating that an actor operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// The actor's mailbox is closed; it has stopped or was shut down.
    #[error("Actor closed: {0}")]
    Closed(String),
}

impl From<tokio::time::error::Elapsed> for ActorError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ActorError::Timeout(format!("Actor operation timed out: {}", err))
    }
}

// Re-export AppError for convenience
pub use crate::error::AppError;

/// Messages that can be sent to the `LlmActor`.
#[derive(Debug)]
pub enum LlmMessage {
    /// A request to generate a complete text response.
    Generate {
        prompt: String,
        system_prompt: Option<String>,
        temperature: Option<f32>,
        /// A channel to send the final `String` result back.
        responder: oneshot::Sender<Result<String, AppError>>,
    },
}

/// Messages that can be sent to the thought store owned by the `ThoughtManager`.
#[derive(Debug)]
pub enum ThoughtMessage {
    /// Append a freshly generated thought to its character's queue.
    Store { thought: Thought },
    /// Pop the oldest thought belonging to one character.
    TakeFor {
        character: String,
        responder: oneshot::Sender<Option<Thought>>,
    },
    /// Pop the oldest thought across every character.
    Next {
        responder: oneshot::Sender<Option<Thought>>,
    },
    /// Per-character counts of queued thoughts.
    Counts {
        responder: oneshot::Sender<HashMap<String, usize>>,
    },
    /// Stop the store; queued thoughts are dropped.
    Shutdown,
}
