//! Conversation Flow - the heuristic turn-selection policy.
//!
//! Decision tree, evaluated in fixed priority order:
//! 1. no prior turn: a random active character opens, addressing everyone;
//! 2. a question addressed to the user: hand the turn to the user;
//! 3. a turn addressed to a known character: that character answers;
//! 4. otherwise: after an idle period a character may start a new thread,
//!    else the user continues.
//!
//! Random draws happen only when a branch's deterministic conditions hold, so a
//! scripted `RandomSource` sees exactly one draw per probabilistic branch reached.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{TurnContext, TurnPolicy};
use crate::brain::ConversationAnalyzer;
use crate::config::FlowConfig;
use crate::error::AppError;
use crate::models::{is_user, ConversationEvent, TurnDecision, EVERYONE, USER, USER_DISPLAY};
use crate::random::RandomSource;

pub const REASON_WAITING_INITIAL: &str = "Waiting for initial user input";
pub const REASON_STARTING: &str = "Starting new conversation thread";
pub const REASON_AWAIT_ANSWER: &str = "Waiting for user's response";
pub const REASON_DIRECT_ADDRESS: &str = "Responding to direct address";
pub const REASON_WAITING: &str = "Waiting for user input";
pub const REASON_INITIATING: &str = "Initiating new conversation thread";
pub const REASON_CONTINUING: &str = "Continuing conversation";

/// Heuristic turn policy over a fixed set of character names.
pub struct ConversationFlow {
    characters: Vec<String>,
    config: FlowConfig,
    rng: Arc<dyn RandomSource>,
    last_user_interaction: Mutex<Instant>,
}

impl ConversationFlow {
    pub fn new(characters: Vec<String>, config: FlowConfig, rng: Arc<dyn RandomSource>) -> Self {
        Self {
            characters,
            config,
            rng,
            last_user_interaction: Mutex::new(Instant::now()),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Records that the user spoke now.
    pub fn mark_user_interaction(&self) {
        self.mark_user_interaction_at(Instant::now());
    }

    pub fn mark_user_interaction_at(&self, at: Instant) {
        *self.last_interaction() = at;
    }

    /// Time since the user last spoke.
    pub fn idle_for(&self) -> Duration {
        self.last_interaction().elapsed()
    }

    /// True iff the user has been idle past the threshold and the initiation draw hits.
    pub fn should_initiate_conversation(&self) -> bool {
        self.idle_for() > self.config.idle_time_threshold()
            && self.rng.next_f64() < self.config.initiation_chance
    }

    /// Chooses the next speaker, target and reasoning.
    pub fn get_next_speaker(
        &self,
        last_event: Option<&ConversationEvent>,
        active_characters: &[String],
    ) -> TurnDecision {
        let Some(last_event) = last_event else {
            return self.initial_speaker(active_characters);
        };

        if self.should_wait_for_user_response(last_event) {
            return TurnDecision::new(USER, &last_event.speaker, REASON_AWAIT_ANSWER);
        }

        if self.should_handle_direct_address(last_event) {
            return TurnDecision::new(
                &last_event.target,
                &last_event.speaker,
                REASON_DIRECT_ADDRESS,
            );
        }

        self.default_next_speaker(last_event, active_characters)
    }

    fn initial_speaker(&self, active_characters: &[String]) -> TurnDecision {
        if active_characters.is_empty() {
            return TurnDecision::new(USER, EVERYONE, REASON_WAITING_INITIAL);
        }
        let speaker = self.pick(active_characters);
        TurnDecision::new(speaker, EVERYONE, REASON_STARTING)
    }

    fn should_wait_for_user_response(&self, last_event: &ConversationEvent) -> bool {
        is_user(&last_event.target)
            && ConversationAnalyzer::is_question(&last_event.message)
            && self.rng.next_f64() < self.config.user_response_chance
    }

    fn should_handle_direct_address(&self, last_event: &ConversationEvent) -> bool {
        self.characters.contains(&last_event.target)
            && self.rng.next_f64() < self.config.direct_response_chance
    }

    fn default_next_speaker(
        &self,
        last_event: &ConversationEvent,
        active_characters: &[String],
    ) -> TurnDecision {
        if active_characters.is_empty() {
            return TurnDecision::new(USER, EVERYONE, REASON_WAITING);
        }

        if self.should_initiate_conversation() {
            let speaker = self.pick(active_characters);
            // The target may coincide with the speaker; see DESIGN.md.
            let target = if self.rng.next_f64() < self.config.initiate_toward_user_chance {
                USER_DISPLAY.to_string()
            } else {
                self.pick(&self.characters)
            };
            debug!(%speaker, %target, "Idle conversation restarted");
            return TurnDecision::new(speaker, target, REASON_INITIATING);
        }

        TurnDecision::new(USER, &last_event.speaker, REASON_CONTINUING)
    }

    fn pick(&self, names: &[String]) -> String {
        names[self.rng.pick_index(names.len())].clone()
    }

    fn last_interaction(&self) -> MutexGuard<'_, Instant> {
        match self.last_user_interaction.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl TurnPolicy for ConversationFlow {
    fn note_user_interaction(&self) {
        self.mark_user_interaction();
    }

    async fn next_turn(&self, context: TurnContext) -> Result<TurnDecision, AppError> {
        Ok(self.get_next_speaker(context.last_event.as_ref(), &context.active_characters))
    }
}
