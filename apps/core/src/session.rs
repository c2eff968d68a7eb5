//! Play session: the glue between a line of user input and the utterances it produces.
//!
//! The orchestrator decides whose turn it conceptually is. The session then
//! asks that character directly for its reply, lets a few others react, and
//! records every produced line through the orchestrator so the history stays
//! bounded regardless of who wrote to it. An optional narrator opens the scene
//! and may describe the last turn; narration goes to the event sink, not the
//! history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::actors::narrator::Narrator;
use crate::actors::orchestrator::Orchestrator;
use crate::actors::traits::{Character, LlmActor};
use crate::error::AppError;
use crate::models::{ResponseContext, Utterance, USER_DISPLAY};

/// Message that asks a character to turn to the user with a question.
pub const PROMPT_USER: &str = "What are your thoughts on this?";

pub struct PlaySession {
    orchestrator: Orchestrator,
    narrator: Option<Narrator>,
    started: AtomicBool,
}

impl PlaySession {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            narrator: None,
            started: AtomicBool::new(false),
        }
    }

    /// Adds a narrator sharing the orchestrator's scene, history and sink.
    pub fn with_narrator(mut self, llm: Arc<dyn LlmActor>) -> Self {
        self.narrator = Some(Narrator::new(
            llm,
            self.orchestrator.scene().clone(),
            self.orchestrator.history().clone(),
            self.orchestrator.sink(),
            self.orchestrator.config().generation_timeout(),
        ));
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Sets the scene, starts the thought producer and returns the opening
    /// lines: the narrated scene, when there is a narrator, then a character's.
    #[instrument(skip(self, scene))]
    pub async fn start(&self, scene: &str) -> Result<Vec<Utterance>, AppError> {
        let mut opening = Vec::with_capacity(2);
        match &self.narrator {
            Some(narrator) => opening.push(narrator.set_scene(scene)),
            None => self.orchestrator.scene().set(scene),
        }
        self.orchestrator.start_thoughts()?;
        let first = self.orchestrator.initial_utterance().await;
        info!("Play started, {} opens", first.speaker);
        opening.push(first);
        self.started.store(true, Ordering::SeqCst);
        Ok(opening)
    }

    /// Runs one user turn and returns every line it produced, in order.
    ///
    /// Fails only when called before `start` or after `shutdown`.
    #[instrument(skip(self, input))]
    pub async fn process_user_input(&self, input: &str) -> Result<Vec<Utterance>, AppError> {
        if !self.is_started() {
            return Err(AppError::Config(
                "Play must be started before processing input".to_string(),
            ));
        }

        let formatted = quote_input(input);
        let decision = self
            .orchestrator
            .determine_next_interaction(USER_DISPLAY, &formatted)
            .await;

        let roster = self.orchestrator.roster();
        let primary = match roster.get(&decision.speaker) {
            Some(character) => character,
            None => {
                // The user holds the turn; someone still answers what was said.
                let names = roster.names();
                let pick = self.orchestrator.random().pick_index(names.len());
                roster
                    .get(&names[pick])
                    .ok_or_else(|| AppError::Internal("Roster lookup failed".to_string()))?
            }
        };

        let mut utterances = Vec::new();
        let reply = self.speak(&primary, &formatted, USER_DISPLAY).await;
        utterances.push(self.record(primary.name(), USER_DISPLAY, reply.clone())?);

        self.react(&primary, &reply, &mut utterances).await?;

        if let Some(narrator) = &self.narrator {
            if let Some(observation) = narrator.get_observation().await {
                utterances.push(observation);
            }
        }

        let names = roster.names();
        let prompter = roster
            .get(&names[self.orchestrator.random().pick_index(names.len())])
            .ok_or_else(|| AppError::Internal("Roster lookup failed".to_string()))?;
        let question = self.speak(&prompter, PROMPT_USER, USER_DISPLAY).await;
        utterances.push(self.record(prompter.name(), USER_DISPLAY, question)?);

        Ok(utterances)
    }

    /// 1..=max_reactions other characters react to the primary reply; each may
    /// draw a follow-up from the primary speaker.
    async fn react(
        &self,
        primary: &Arc<dyn Character>,
        primary_reply: &str,
        utterances: &mut Vec<Utterance>,
    ) -> Result<(), AppError> {
        let config = self.orchestrator.config();
        let random = self.orchestrator.random();
        let mut remaining: Vec<Arc<dyn Character>> = self
            .orchestrator
            .roster()
            .iter()
            .filter(|c| c.name() != primary.name())
            .cloned()
            .collect();
        if remaining.is_empty() || config.max_reactions == 0 {
            return Ok(());
        }

        let wanted = 1 + random.pick_index(config.max_reactions);
        let count = wanted.min(remaining.len());
        debug!("{} reactions to {}", count, primary.name());

        for _ in 0..count {
            let reactor = remaining.swap_remove(random.pick_index(remaining.len()));
            let reaction = self.speak(&reactor, primary_reply, primary.name()).await;
            utterances.push(self.record(reactor.name(), primary.name(), reaction.clone())?);

            if random.next_f64() < config.reaction_followup_chance {
                let followup = self.speak(primary, &reaction, reactor.name()).await;
                utterances.push(self.record(primary.name(), reactor.name(), followup)?);
            }
        }
        Ok(())
    }

    async fn speak(&self, character: &Arc<dyn Character>, message: &str, speaker: &str) -> String {
        let context = ResponseContext::for_scene(self.orchestrator.scene().current());
        match timeout(
            self.orchestrator.config().generation_timeout(),
            character.respond_to(message, speaker, &context),
        )
        .await
        {
            Ok(reply) => reply,
            Err(_) => format!("[{}]: *looks uncertain*", character.name()),
        }
    }

    fn record(&self, speaker: &str, target: &str, text: String) -> Result<Utterance, AppError> {
        self.orchestrator.record_turn(speaker, target, &text)?;
        Ok(Utterance {
            speaker: speaker.to_string(),
            target: target.to_string(),
            text,
        })
    }

    /// Stops the thought producer and the response pool.
    pub async fn shutdown(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.orchestrator.shutdown().await;
    }
}

/// Wraps input in double quotes exactly once.
pub fn quote_input(input: &str) -> String {
    let cleaned = input.trim().trim_matches(|c| c == '"' || c == '\'');
    format!("\"{}\"", cleaned)
}
