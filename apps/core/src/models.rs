use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Sentinel speaker meaning "the human participant"; compared case-insensitively.
pub const USER: &str = "user";
/// Exact speaker label the external glue uses when the human has just spoken.
pub const USER_DISPLAY: &str = "User";
/// Sentinel target meaning "everyone in the scene".
pub const EVERYONE: &str = "ALL";
/// Message a character answers when the scene opens.
pub const SCENE_START: &str = "SCENE_START";

/// Returns true for the case-insensitive "user" sentinel.
pub fn is_user(name: &str) -> bool {
    name.eq_ignore_ascii_case(USER)
}

/// One recorded turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    /// Who spoke: a character name or the user sentinel.
    pub speaker: String,
    /// Who was addressed: a character name, the user sentinel or "ALL".
    pub target: String,
    /// What was said.
    pub message: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ConversationEvent {
    pub fn new(
        speaker: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            target: target.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// "speaker to target: message", the line format used in prompts.
    pub fn as_line(&self) -> String {
        format!("{} to {}: {}", self.speaker, self.target, self.message)
    }
}

/// A precomputed hidden thought, consumed at most once by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thought {
    pub character: String,
    pub text: String,
}

/// The outcome of a turn decision: who speaks next, to whom, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnDecision {
    #[serde(rename = "next_speaker", alias = "speaker")]
    pub speaker: String,
    pub target: String,
    pub reasoning: String,
}

impl TurnDecision {
    pub fn new(
        speaker: impl Into<String>,
        target: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            target: target.into(),
            reasoning: reasoning.into(),
        }
    }

    /// Whether the engine should pause for human input.
    pub fn awaits_user(&self) -> bool {
        is_user(&self.speaker)
    }
}

/// Static description of a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CharacterProfile {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub gender: String,
    /// Trait name mapped to a strength in [0, 1].
    #[serde(default)]
    pub personality: BTreeMap<String, f32>,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub hidden_motive: String,
}

impl CharacterProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gender: String::new(),
            personality: BTreeMap::new(),
            background: String::new(),
            hidden_motive: String::new(),
        }
    }

    pub fn with_trait(mut self, name: impl Into<String>, strength: f32) -> Self {
        self.personality.insert(name.into(), strength);
        self
    }

    pub fn with_motive(mut self, motive: impl Into<String>) -> Self {
        self.hidden_motive = motive.into();
        self
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    /// "trait: 0.8, other: 0.3"
    pub fn trait_summary(&self) -> String {
        self.personality
            .iter()
            .map(|(name, strength)| format!("{}: {:.1}", name, strength))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Checks field constraints plus the [0, 1] range of every trait strength.
    pub fn check(&self) -> Result<(), crate::error::AppError> {
        self.validate()?;
        if let Some((name, strength)) = self
            .personality
            .iter()
            .find(|(_, s)| !(0.0..=1.0).contains(*s))
        {
            return Err(crate::error::AppError::Validation(format!(
                "trait '{}' of {} has strength {} outside [0, 1]",
                name, self.name, strength
            )));
        }
        Ok(())
    }
}

/// Context handed to a character together with the message it answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseContext {
    /// Current scene text.
    pub scene: String,
    /// Soft hint: recent turns already covered the same topic.
    pub avoid_similar_response: bool,
}

impl ResponseContext {
    pub fn for_scene(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            avoid_similar_response: false,
        }
    }
}

/// A line produced during a play session, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub target: String,
    pub text: String,
}
