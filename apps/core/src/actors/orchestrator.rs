use crate::actors::dispatch::{ResponseJob, ResponsePool};
use crate::actors::thoughts::{ThoughtManager, ThoughtQueue};
use crate::actors::traits::ThoughtGenerator;
use crate::brain::ConversationAnalyzer;
use crate::config::{FlowConfig, OrchestratorConfig};
use crate::error::AppError;
use crate::event_log::{EventSink, FlowEvent, NoopSink};
use crate::flow::{ConversationFlow, TurnContext, TurnPolicy};
use crate::history::HistoryHandle;
use crate::models::{
    is_user, ConversationEvent, ResponseContext, Thought, TurnDecision, EVERYONE, SCENE_START,
    USER, USER_DISPLAY, Utterance,
};
use crate::random::{RandomSource, ThreadRandom};
use crate::roster::Roster;
use crate::scene::SceneHandle;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

/// Turns a policy looks back over, both for eligibility and for topic overlap.
const RECENT_WINDOW: usize = 3;

pub const FALLBACK_TO_CHARACTER: &str = "Responding to user's message";
pub const FALLBACK_TO_USER: &str = "Awaiting user's response";

/// The façade that advances the conversation one externally triggered step at a time.
///
/// Owns the bounded history, the turn policy, the thought manager and the pool
/// running detached character replies. Every public operation absorbs
/// generation failures; only misuse surfaces as an error.
pub struct Orchestrator {
    roster: Roster,
    history: HistoryHandle,
    policy: Arc<dyn TurnPolicy>,
    thoughts: ThoughtManager,
    pool: ResponsePool,
    scene: SceneHandle,
    sink: Arc<dyn EventSink>,
    random: Arc<dyn RandomSource>,
    config: OrchestratorConfig,
}

/// Assembles an `Orchestrator`; everything but the roster and thought generator
/// has a default.
pub struct OrchestratorBuilder {
    roster: Roster,
    generator: Arc<dyn ThoughtGenerator>,
    config: OrchestratorConfig,
    flow: FlowConfig,
    policy: Option<Arc<dyn TurnPolicy>>,
    sink: Arc<dyn EventSink>,
    random: Arc<dyn RandomSource>,
    scene: SceneHandle,
    thought_queue: Option<ThoughtQueue>,
}

impl OrchestratorBuilder {
    pub fn new(roster: Roster, generator: Arc<dyn ThoughtGenerator>) -> Self {
        Self {
            roster,
            generator,
            config: OrchestratorConfig::default(),
            flow: FlowConfig::default(),
            policy: None,
            sink: Arc::new(NoopSink),
            random: Arc::new(ThreadRandom),
            scene: SceneHandle::default(),
            thought_queue: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn flow(mut self, flow: FlowConfig) -> Self {
        self.flow = flow;
        self
    }

    /// Replaces the default `ConversationFlow` policy.
    pub fn policy(mut self, policy: Arc<dyn TurnPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn scene(mut self, scene: SceneHandle) -> Self {
        self.scene = scene;
        self
    }

    /// Thought store the characters were built with; a fresh one otherwise.
    pub fn thought_queue(mut self, queue: ThoughtQueue) -> Self {
        self.thought_queue = Some(queue);
        self
    }

    /// Validates the configuration and wires the components. Must run inside a
    /// Tokio runtime; the thought producer stays idle until `start_thoughts`.
    pub fn build(self) -> Result<Orchestrator, AppError> {
        self.config.validate()?;
        self.flow.validate()?;

        let history = HistoryHandle::new(self.config.max_history_length);
        let policy = match self.policy {
            Some(policy) => policy,
            None => Arc::new(ConversationFlow::new(
                self.roster.names(),
                self.flow,
                Arc::clone(&self.random),
            )),
        };
        let thoughts = ThoughtManager::with_queue(
            self.thought_queue.unwrap_or_else(ThoughtQueue::spawn),
            self.roster.profiles(),
            self.generator,
            history.clone(),
            self.scene.clone(),
            Arc::clone(&self.sink),
            &self.config,
        );
        let pool = ResponsePool::new(
            self.roster.len(),
            self.config.dispatch_queue_capacity,
            self.config.generation_timeout(),
        );

        info!(
            "Orchestrator ready with {} characters: {:?}",
            self.roster.len(),
            self.roster.names()
        );
        Ok(Orchestrator {
            roster: self.roster,
            history,
            policy,
            thoughts,
            pool,
            scene: self.scene,
            sink: self.sink,
            random: self.random,
            config: self.config,
        })
    }
}

impl Orchestrator {
    pub fn builder(roster: Roster, generator: Arc<dyn ThoughtGenerator>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(roster, generator)
    }

    /// Starts the background thought producer.
    pub fn start_thoughts(&self) -> Result<(), AppError> {
        self.thoughts.start()
    }

    /// Decides who speaks next after `last_speaker` said `last_message`, records
    /// that turn, and detaches a reply from the chosen character.
    ///
    /// Never fails: any error along the way yields the fallback decision.
    #[instrument(skip(self, last_message))]
    pub async fn determine_next_interaction(
        &self,
        last_speaker: &str,
        last_message: &str,
    ) -> TurnDecision {
        let decision = match self.try_next_interaction(last_speaker, last_message).await {
            Ok(decision) => decision,
            Err(e) => {
                error!("Error in orchestrator: {}", e);
                self.fallback_interaction(last_speaker)
            }
        };
        self.sink.record(FlowEvent::FlowDecision {
            last_speaker: last_speaker.to_string(),
            next_speaker: decision.speaker.clone(),
            target: decision.target.clone(),
            reasoning: decision.reasoning.clone(),
        });
        decision
    }

    async fn try_next_interaction(
        &self,
        last_speaker: &str,
        last_message: &str,
    ) -> Result<TurnDecision, AppError> {
        if last_speaker == USER_DISPLAY {
            self.policy.note_user_interaction();
        }

        let recent_history = self.history.recent(RECENT_WINDOW)?;
        let context = TurnContext {
            last_event: recent_history.last().cloned(),
            active_characters: self.active_characters(&[])?,
            last_speaker: last_speaker.to_string(),
            last_message: last_message.to_string(),
            recent_history,
        };
        let preceding = context.recent_history.clone();

        let decision = self.policy.next_turn(context).await?;
        if !self.roster.contains(&decision.speaker) && !is_user(&decision.speaker) {
            return Err(AppError::UnknownParticipant(decision.speaker));
        }
        debug!(
            "Next: {} -> {} ({})",
            decision.speaker, decision.target, decision.reasoning
        );

        self.record_turn(last_speaker, &decision.target, last_message)?;

        if let Some(character) = self.roster.get(&decision.speaker) {
            let avoid_similar_response = preceding.iter().any(|event| {
                event.speaker != decision.speaker
                    && ConversationAnalyzer::check_similar_topics(last_message, &event.message)
            });
            let job = ResponseJob {
                character,
                message: last_message.to_string(),
                speaker: decision.target.clone(),
                context: ResponseContext {
                    scene: self.scene.current(),
                    avoid_similar_response,
                },
            };
            if let Err(e) = self.pool.dispatch(job) {
                warn!("Detached reply from {} not scheduled: {}", decision.speaker, e);
            }
        }

        Ok(decision)
    }

    /// Appends a turn to history, evicting the oldest past capacity.
    ///
    /// Used by the turn path and by callers adding unscheduled turns such as
    /// reactions. Both names must be a character, the user or "ALL".
    pub fn record_turn(
        &self,
        speaker: &str,
        target: &str,
        message: &str,
    ) -> Result<ConversationEvent, AppError> {
        for name in [speaker, target] {
            if !self.roster.is_participant(name) {
                return Err(AppError::UnknownParticipant(name.to_string()));
            }
        }
        let event = self
            .history
            .record(ConversationEvent::new(speaker, target, message))?;
        self.sink.record(FlowEvent::Dialogue {
            speaker: event.speaker.clone(),
            target: event.target.clone(),
            message: event.message.clone(),
        });
        Ok(event)
    }

    /// Characters that did not speak in the last three turns, minus `exclude`,
    /// in roster order.
    pub fn active_characters(&self, exclude: &[&str]) -> Result<Vec<String>, AppError> {
        let recent_speakers: HashSet<String> = self
            .history
            .recent(RECENT_WINDOW)?
            .into_iter()
            .map(|event| event.speaker)
            .filter(|speaker| self.roster.contains(speaker))
            .collect();
        Ok(self
            .roster
            .names()
            .into_iter()
            .filter(|name| !recent_speakers.contains(name) && !exclude.contains(&name.as_str()))
            .collect())
    }

    /// The decision returned when normal turn selection fails.
    pub fn fallback_interaction(&self, last_speaker: &str) -> TurnDecision {
        let first = self.roster.first_name();
        if is_user(last_speaker) {
            TurnDecision::new(first, USER_DISPLAY, FALLBACK_TO_CHARACTER)
        } else {
            TurnDecision::new(USER, first, FALLBACK_TO_USER)
        }
    }

    /// A random character opens the scene, addressing everyone.
    pub async fn get_initial_character_response(&self) -> String {
        self.initial_utterance().await.text
    }

    /// Same as `get_initial_character_response`, keeping who spoke.
    #[instrument(skip(self))]
    pub async fn initial_utterance(&self) -> Utterance {
        let names = self.roster.names();
        let speaker = names[self.random.pick_index(names.len())].clone();
        match self.opening_line(&speaker).await {
            Ok(text) => Utterance {
                speaker,
                target: EVERYONE.to_string(),
                text,
            },
            Err(e) => {
                error!("Error generating initial response: {}", e);
                let first = self.roster.first_name();
                Utterance {
                    text: format!("[{}]: *looks around curiously*", first),
                    speaker: first,
                    target: EVERYONE.to_string(),
                }
            }
        }
    }

    async fn opening_line(&self, speaker: &str) -> Result<String, AppError> {
        let character = self
            .roster
            .get(speaker)
            .ok_or_else(|| AppError::UnknownParticipant(speaker.to_string()))?;
        let context = ResponseContext::for_scene(self.scene.current());
        let reply = timeout(
            self.config.generation_timeout(),
            character.respond_to(SCENE_START, EVERYONE, &context),
        )
        .await?;
        self.record_turn(speaker, EVERYONE, &reply)?;
        Ok(reply)
    }

    /// Oldest queued thought across all characters; `None` when empty.
    pub async fn get_next_thought(&self) -> Option<Thought> {
        self.thoughts.get_next_thought().await
    }

    pub fn thoughts(&self) -> &ThoughtManager {
        &self.thoughts
    }

    pub fn history(&self) -> &HistoryHandle {
        &self.history
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn random(&self) -> Arc<dyn RandomSource> {
        Arc::clone(&self.random)
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    /// Completed detached replies.
    pub fn completed_dispatches(&self) -> usize {
        self.pool.completed()
    }

    /// Stops the thought producer, then drains and stops the response pool.
    pub async fn shutdown(&self) {
        self.thoughts.shutdown().await;
        self.pool.shutdown().await;
        info!("Orchestrator shut down");
    }
}
