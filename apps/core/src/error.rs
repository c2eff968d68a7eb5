use thiserror::Error;

/// Application-wide error type, consolidating all possible errors into a single enum.
#[derive(Debug, Error, Clone)]
pub enum AppError {
    /// Represents errors specific to the actor system, such as communication failures.
    #[error("Actor error: {0}")]
    Actor(#[from] crate::actors::messages::ActorError),

    /// Represents data validation errors (e.g., an out-of-range probability).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Represents configuration-related errors (e.g., an empty roster or a malformed variable).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A language model call failed or returned unusable output.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Structured model output (a flow decision) could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A speaker or target that is neither a known character nor a sentinel.
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    /// Represents unexpected internal errors that indicate a bug.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Represents errors from operations that did not complete in time.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The component has been shut down and no longer accepts work.
    #[error("Component is shut down")]
    Shutdown,
}

impl AppError {
    /// Whether the failure is one the engine absorbs with a fallback instead of
    /// returning it to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Actor(_)
                | AppError::Generation(_)
                | AppError::Parse(_)
                | AppError::UnknownParticipant(_)
                | AppError::Timeout(_)
                | AppError::Internal(_)
        )
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(format!("Operation timed out: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation errors: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Generation(format!("HTTP error: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for AppError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        AppError::Internal(format!("Lock poisoned: {}", err))
    }
}
