use crate::actors::thoughts::ThoughtQueue;
use crate::actors::traits::{Character, LlmActor};
use crate::error::AppError;
use crate::models::{CharacterProfile, ResponseContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

pub const DEFAULT_MEMORY_SIZE: usize = 10;
const PROMPT_MEMORIES: usize = 3;
const NO_THOUGHT: &str = "Just focusing on the current situation.";

/// One exchange a character remembers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub speaker: String,
    pub message: String,
    pub response: String,
    pub hidden_thought: Option<String>,
}

impl fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.speaker, self.message, self.response)
    }
}

/// Bounded, oldest-evicted list of exchanges.
#[derive(Debug, Clone)]
pub struct CharacterMemory {
    events: VecDeque<MemoryEvent>,
    capacity: usize,
}

impl Default for CharacterMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

impl CharacterMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, event: MemoryEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// The last `count` exchanges, one "speaker: message -> response" per line.
    pub fn recent(&self, count: usize) -> String {
        let skip = self.events.len().saturating_sub(count);
        self.events
            .iter()
            .skip(skip)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Who the human participant is, as characters should perceive them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A character whose replies come from the language model.
pub struct LlmCharacter {
    profile: CharacterProfile,
    llm: Arc<dyn LlmActor>,
    thoughts: ThoughtQueue,
    memory: Mutex<CharacterMemory>,
    user: Option<UserIdentity>,
    generation_timeout: Duration,
}

impl LlmCharacter {
    /// Fails if the profile does not validate.
    pub fn new(
        profile: CharacterProfile,
        llm: Arc<dyn LlmActor>,
        thoughts: ThoughtQueue,
        generation_timeout: Duration,
    ) -> Result<Self, AppError> {
        profile.check()?;
        Ok(Self {
            profile,
            llm,
            thoughts,
            memory: Mutex::new(CharacterMemory::default()),
            user: None,
            generation_timeout,
        })
    }

    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }

    pub fn recent_memories(&self) -> String {
        self.memory
            .lock()
            .map(|memory| memory.recent(PROMPT_MEMORIES))
            .unwrap_or_default()
    }

    fn build_prompt(
        &self,
        message: &str,
        speaker: &str,
        context: &ResponseContext,
        thought: &str,
    ) -> String {
        let mut prompt = format!(
            "You are {name}, a character in an interactive play.\n\n\
             Your personality traits are: {traits}\n\
             Your background: {background}\n\
             Your hidden motive (never reveal this directly): {motive}\n\
             Your current inner thought: {thought}\n\n\
             Current context: {scene}\n\
             Previous interactions: {memory}\n",
            name = self.profile.name,
            traits = self.profile.trait_summary(),
            background = self.profile.background,
            motive = self.profile.hidden_motive,
            thought = thought,
            scene = context.scene,
            memory = self.recent_memories(),
        );
        if let Some(user) = &self.user {
            prompt.push_str(&format!(
                "The user you are talking with is {}. {}\n",
                user.name, user.description
            ));
        }
        prompt.push_str(&format!("\n{} says to you: \"{}\"\n\n", speaker, message));
        prompt.push_str(
            "Important guidelines:\n\
             - Stay in character at all times\n\
             - React naturally to both emotional content and implications\n\
             - Write only spoken dialogue and actions like it's a play\n",
        );
        if context.avoid_similar_response {
            prompt.push_str("- Others just covered this topic: offer a different perspective\n");
        }
        prompt.push_str("\nResponse:");
        prompt
    }

    async fn generate_reply(&self, prompt: String) -> Result<String, AppError> {
        let raw = timeout(
            self.generation_timeout,
            self.llm.generate_with_params(prompt, None, None),
        )
        .await??;
        let reply = strip_own_label(&self.profile.name, raw.trim()).replace('\n', " ");
        if reply.trim().is_empty() {
            return Err(AppError::Generation(format!(
                "Empty reply from {}",
                self.profile.name
            )));
        }
        Ok(reply.trim().to_string())
    }
}

#[async_trait]
impl Character for LlmCharacter {
    fn profile(&self) -> &CharacterProfile {
        &self.profile
    }

    #[instrument(skip(self, message, context), fields(character = %self.profile.name))]
    async fn respond_to(&self, message: &str, speaker: &str, context: &ResponseContext) -> String {
        let hidden_thought = self.thoughts.take_for(&self.profile.name).await.map(|t| t.text);
        let prompt = self.build_prompt(
            message,
            speaker,
            context,
            hidden_thought.as_deref().unwrap_or(NO_THOUGHT),
        );

        match self.generate_reply(prompt).await {
            Ok(reply) => {
                debug!("Reply generated");
                match self.memory.lock() {
                    Ok(mut memory) => memory.add(MemoryEvent {
                        speaker: speaker.to_string(),
                        message: message.to_string(),
                        response: reply.clone(),
                        hidden_thought,
                    }),
                    Err(e) => warn!("Memory unavailable: {}", e),
                }
                format!("[{}]: {}", self.profile.name, reply)
            }
            Err(e) => {
                warn!("Error generating character response: {}", e);
                format!("[{}]: *looks uncertain*", self.profile.name)
            }
        }
    }
}

/// Models often echo "[Name]:" or "Name:" in front of the line.
fn strip_own_label<'a>(name: &str, reply: &'a str) -> &'a str {
    let bracketed = format!("[{}]:", name);
    let plain = format!("{}:", name);
    reply
        .strip_prefix(bracketed.as_str())
        .or_else(|| reply.strip_prefix(plain.as_str()))
        .unwrap_or(reply)
        .trim_start()
}
