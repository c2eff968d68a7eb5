//! Model-driven turn policy.
//!
//! Asks the language model for a JSON object `{next_speaker, target, reasoning}`
//! and validates it against the roster. Any failure is returned as an error so the
//! orchestrator can apply its deterministic fallback.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{TurnContext, TurnPolicy};
use crate::actors::traits::LlmActor;
use crate::error::AppError;
use crate::models::{is_user, TurnDecision, EVERYONE};
use crate::roster::Roster;
use crate::scene::SceneHandle;

/// Low temperature keeps the JSON shape stable.
const DIRECTOR_TEMPERATURE: f32 = 0.25;
const HISTORY_WINDOW: usize = 3;

// Compiled once; the patterns are constant.
static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json)?\s*").expect("Invalid regex: opening fence"));
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("Invalid regex: closing fence"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("Invalid regex: trailing comma"));

pub struct LlmFlowDirector {
    llm: Arc<dyn LlmActor>,
    characters: Vec<String>,
    character_descriptions: String,
    scene: SceneHandle,
    generation_timeout: Duration,
}

impl LlmFlowDirector {
    pub fn new(
        llm: Arc<dyn LlmActor>,
        roster: &Roster,
        scene: SceneHandle,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            characters: roster.names(),
            character_descriptions: roster.describe(),
            scene,
            generation_timeout,
        }
    }

    fn build_prompt(&self, context: &TurnContext) -> String {
        let skip = context.recent_history.len().saturating_sub(HISTORY_WINDOW);
        let history = context.recent_history[skip..]
            .iter()
            .map(|event| event.as_line())
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "As an orchestrator in an interactive play, manage the conversation flow naturally.\n\n\
             Current scene: {scene}\n\
             Available characters and their traits:\n{characters}\n\n\
             Last speaker: {last_speaker}\n\
             Last message: \"{last_message}\"\n\n\
             Recent conversation history:\n{history}\n\n\
             Important rules:\n\
             1. When the user speaks, at least one character should respond directly to them\n\
             2. Characters should actively engage with each other, not just with the user\n\
             3. Characters should react to each other's statements and emotions\n\
             4. If a character asks the user a question, set next_speaker as \"user\"\n\
             5. Characters should sometimes disagree based on their personalities\n\
             6. Keep a mix of user interaction and character-to-character dialogue\n\n\
             Return ONLY a JSON object in this exact format:\n\
             {{\"next_speaker\": \"name\", \"target\": \"name\", \"reasoning\": \"brief explanation\"}}",
            scene = self.scene.current(),
            characters = self.character_descriptions,
            last_speaker = context.last_speaker,
            last_message = context.last_message,
            history = history,
        )
    }

    /// Parses a cleaned model reply and checks both names against the roster.
    pub fn parse_decision(&self, raw: &str) -> Result<TurnDecision, AppError> {
        let cleaned = clean_json_response(raw);
        let decision: TurnDecision = serde_json::from_str(&cleaned)
            .map_err(|e| AppError::Parse(format!("Flow decision '{}': {}", cleaned, e)))?;

        if !self.is_known(&decision.speaker) {
            return Err(AppError::UnknownParticipant(decision.speaker));
        }
        if !self.is_known(&decision.target) && decision.target != EVERYONE {
            return Err(AppError::UnknownParticipant(decision.target));
        }
        Ok(decision)
    }

    fn is_known(&self, name: &str) -> bool {
        is_user(name) || self.characters.iter().any(|c| c == name)
    }
}

#[async_trait]
impl TurnPolicy for LlmFlowDirector {
    async fn next_turn(&self, context: TurnContext) -> Result<TurnDecision, AppError> {
        let prompt = self.build_prompt(&context);
        let raw = timeout(
            self.generation_timeout,
            self.llm
                .generate_with_params(prompt, None, Some(DIRECTOR_TEMPERATURE)),
        )
        .await??;
        debug!("Flow director replied: {}", raw);

        self.parse_decision(&raw).inspect_err(|e| {
            warn!("Discarding flow decision: {}", e);
        })
    }
}

/// Strips code fences, newlines, backslashes and trailing commas from a model reply.
pub fn clean_json_response(raw: &str) -> String {
    let trimmed = raw.trim();
    let unfenced = OPENING_FENCE.replace(trimmed, "");
    let unfenced = CLOSING_FENCE.replace(&unfenced, "");
    let flattened = unfenced
        .trim()
        .replace("\\n", " ")
        .replace('\n', " ")
        .replace('\\', "");
    TRAILING_COMMA.replace_all(&flattened, "$1").into_owned()
}
