use crate::actors::messages::AppError;
use crate::models::{CharacterProfile, ResponseContext};
use async_trait::async_trait;

/// Defines the public interface for an LLM (Large Language Model) actor.
///
/// This trait abstracts the specific implementation of the LLM, allowing for different
/// backends (e.g., local llama.cpp, remote API) to be used interchangeably.
#[async_trait]
pub trait LlmActor: Send + Sync + 'static {
    /// Generates a complete text response based on a prompt and optional parameters.
    async fn generate_with_params(
        &self,
        prompt: String,
        system_prompt: Option<String>,
        temperature: Option<f32>,
    ) -> Result<String, AppError>;
}

/// A conversational participant the orchestrator can hand a turn to.
///
/// Implementations must be safe to call concurrently and must absorb their own
/// generation failures: `respond_to` always returns a usable line.
#[async_trait]
pub trait Character: Send + Sync + 'static {
    /// Read-only name, traits and motive.
    fn profile(&self) -> &CharacterProfile;

    fn name(&self) -> &str {
        &self.profile().name
    }

    /// Produces this character's reply to `message`, said by `speaker`.
    async fn respond_to(&self, message: &str, speaker: &str, context: &ResponseContext) -> String;
}

/// Everything a thought generator sees about one character.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtRequest {
    pub character_name: String,
    pub trait_summary: String,
    pub hidden_motive: String,
    pub scene: String,
    pub recent_history: String,
}

/// Produces a single line of hidden internal monologue.
#[async_trait]
pub trait ThoughtGenerator: Send + Sync + 'static {
    async fn generate_thought(&self, request: ThoughtRequest) -> Result<String, AppError>;
}
