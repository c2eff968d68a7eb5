//! Narrator
//!
//! Opens the scene and, after a turn, may add a short atmospheric observation.
//! The model answers `SKIP` when nothing needs describing; any failure reads
//! the same as a skip.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::actors::traits::LlmActor;
use crate::event_log::{EventSink, FlowEvent, NarrationKind};
use crate::history::HistoryHandle;
use crate::models::{ConversationEvent, Utterance, EVERYONE};
use crate::scene::SceneHandle;

pub const NARRATOR: &str = "Narrator";
const SKIP: &str = "SKIP";
const NARRATOR_TEMPERATURE: f32 = 0.5;

pub struct Narrator {
    llm: Arc<dyn LlmActor>,
    scene: SceneHandle,
    history: HistoryHandle,
    sink: Arc<dyn EventSink>,
    generation_timeout: Duration,
    last_observed: Mutex<Option<ConversationEvent>>,
}

impl Narrator {
    pub fn new(
        llm: Arc<dyn LlmActor>,
        scene: SceneHandle,
        history: HistoryHandle,
        sink: Arc<dyn EventSink>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            scene,
            history,
            sink,
            generation_timeout,
            last_observed: Mutex::new(None),
        }
    }

    /// Replaces the shared scene and returns the opening narration.
    pub fn set_scene(&self, description: &str) -> Utterance {
        let description = description.trim();
        self.scene.set(description);
        self.sink.record(FlowEvent::Narration {
            kind: NarrationKind::Scene,
            text: description.to_string(),
        });
        narration(description)
    }

    /// Asks the model whether `speaker` telling `listener` something deserves narration.
    #[instrument(skip(self, message))]
    pub async fn observe_interaction(
        &self,
        speaker: &str,
        listener: &str,
        message: &str,
    ) -> Option<Utterance> {
        let scene = self.scene.current();
        if scene.trim().is_empty() {
            return None;
        }

        let prompt = build_observation_prompt(&scene, speaker, listener, message);
        let raw = match timeout(
            self.generation_timeout,
            self.llm
                .generate_with_params(prompt, None, Some(NARRATOR_TEMPERATURE)),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Narrator observation failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!("Narrator observation timed out");
                return None;
            }
        };

        let observation = strip_label(&raw);
        if observation.is_empty() || observation.eq_ignore_ascii_case(SKIP) {
            debug!("No narration for {} to {}", speaker, listener);
            return None;
        }
        self.sink.record(FlowEvent::Narration {
            kind: NarrationKind::Observation,
            text: observation.to_string(),
        });
        Some(narration(observation))
    }

    /// Observes the latest recorded turn. Each turn is observed at most once.
    pub async fn get_observation(&self) -> Option<Utterance> {
        let last = self.history.last().ok().flatten()?;
        {
            let mut observed = self.last_observed.lock().ok()?;
            if observed.as_ref() == Some(&last) {
                return None;
            }
            *observed = Some(last.clone());
        }
        self.observe_interaction(&last.speaker, &last.target, &last.message)
            .await
    }
}

fn narration(text: &str) -> Utterance {
    Utterance {
        speaker: NARRATOR.to_string(),
        target: EVERYONE.to_string(),
        text: format!("[{}]: {}", NARRATOR, text),
    }
}

fn strip_label(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("[Narrator]:")
        .or_else(|| trimmed.strip_prefix("Narrator:"))
        .unwrap_or(trimmed)
        .trim()
}

fn build_observation_prompt(scene: &str, speaker: &str, listener: &str, message: &str) -> String {
    format!(
        "As a subtle narrator in an interactive play, decide whether this interaction needs \
         atmospheric description or context, matching the tone of the scene. Narrate only when:\n\
         1. There's a significant change in mood or atmosphere\n\
         2. Important physical actions or movements occur\n\
         3. Environmental changes need to be described\n\
         4. Critical non-verbal cues need to be highlighted\n\n\
         Current scene: {scene}\n\
         Interaction: {speaker} says to {listener}: \"{message}\"\n\n\
         If narration is needed, give a brief, atmospheric description (2-3 sentences).\n\
         If no narration is needed, respond with \"SKIP\".\n\n\
         Response:"
    )
}
