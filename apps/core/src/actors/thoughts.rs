//! Thought Manager
//!
//! Keeps a background supply of hidden thoughts so a character's reply can use
//! an internal monologue that is already generated.
//!
//! Two tasks cooperate:
//! - the **store** actor owns one FIFO per character and answers queue
//!   requests over a channel, so no queue is ever shared behind a lock;
//! - the **producer** tops every character up to `thought_queue_multiplier`
//!   queued thoughts, then sleeps `thought_interval` (or
//!   `thought_error_backoff` after a failed generation).
//!
//! A character takes only from its own queue, so one character can never
//! pull, reorder or starve another character's thoughts.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::actors::messages::{ActorError, AppError, ThoughtMessage};
use crate::actors::traits::{ThoughtGenerator, ThoughtRequest};
use crate::config::OrchestratorConfig;
use crate::event_log::{EventSink, FlowEvent};
use crate::history::HistoryHandle;
use crate::models::{CharacterProfile, Thought};
use crate::scene::SceneHandle;

/// Number of recent turns a thought prompt sees.
const THOUGHT_HISTORY_TURNS: usize = 2;

/// A handle to the thought store actor.
///
/// Cloneable; characters hold one to take their own thoughts.
#[derive(Clone, Debug)]
pub struct ThoughtQueue {
    sender: mpsc::Sender<ThoughtMessage>,
}

impl ThoughtQueue {
    /// Spawns a new, empty store and returns a handle to it.
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel(64);
        let runner = ThoughtStoreRunner::new(receiver);
        tokio::spawn(async move { runner.run().await });
        Self { sender }
    }

    pub async fn store(&self, thought: Thought) -> Result<(), AppError> {
        self.sender
            .send(ThoughtMessage::Store { thought })
            .await
            .map_err(|_| AppError::Actor(ActorError::Closed("Thought store closed".to_string())))
    }

    /// Oldest queued thought of `character`, if any. Never blocks on generation.
    pub async fn take_for(&self, character: &str) -> Option<Thought> {
        let (send, recv) = oneshot::channel();
        let msg = ThoughtMessage::TakeFor {
            character: character.to_string(),
            responder: send,
        };
        self.request(msg, recv).await.flatten()
    }

    /// Oldest queued thought across all characters, if any.
    pub async fn next(&self) -> Option<Thought> {
        let (send, recv) = oneshot::channel();
        self.request(ThoughtMessage::Next { responder: send }, recv)
            .await
            .flatten()
    }

    pub async fn counts(&self) -> Result<HashMap<String, usize>, AppError> {
        let (send, recv) = oneshot::channel();
        self.request(ThoughtMessage::Counts { responder: send }, recv)
            .await
            .ok_or_else(|| AppError::Actor(ActorError::Closed("Thought store closed".to_string())))
    }

    /// Total number of queued thoughts; zero once the store is closed.
    pub async fn len(&self) -> usize {
        self.counts()
            .await
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(ThoughtMessage::Shutdown).await;
    }

    async fn request<T>(&self, msg: ThoughtMessage, recv: oneshot::Receiver<T>) -> Option<T> {
        if self.sender.send(msg).await.is_err() {
            debug!("Thought store closed; request dropped");
            return None;
        }
        recv.await.ok()
    }
}

// --- Store Runner (Internal Logic) ---

#[derive(Debug)]
struct QueuedThought {
    seq: u64,
    text: String,
}

struct ThoughtStoreRunner {
    receiver: mpsc::Receiver<ThoughtMessage>,
    queues: HashMap<String, VecDeque<QueuedThought>>,
    next_seq: u64,
}

impl ThoughtStoreRunner {
    fn new(receiver: mpsc::Receiver<ThoughtMessage>) -> Self {
        Self {
            receiver,
            queues: HashMap::new(),
            next_seq: 0,
        }
    }

    async fn run(mut self) {
        debug!("Thought store started");
        while let Some(msg) = self.receiver.recv().await {
            if !self.handle_message(msg) {
                break;
            }
        }
        debug!("Thought store stopped");
    }

    /// Returns false once the store should stop.
    fn handle_message(&mut self, msg: ThoughtMessage) -> bool {
        match msg {
            ThoughtMessage::Store { thought } => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.queues
                    .entry(thought.character)
                    .or_default()
                    .push_back(QueuedThought {
                        seq,
                        text: thought.text,
                    });
            }
            ThoughtMessage::TakeFor {
                character,
                responder,
            } => {
                let thought = self
                    .queues
                    .get_mut(&character)
                    .and_then(VecDeque::pop_front)
                    .map(|queued| Thought {
                        character,
                        text: queued.text,
                    });
                let _ = responder.send(thought);
            }
            ThoughtMessage::Next { responder } => {
                let _ = responder.send(self.pop_oldest());
            }
            ThoughtMessage::Counts { responder } => {
                let counts = self
                    .queues
                    .iter()
                    .map(|(name, queue)| (name.clone(), queue.len()))
                    .collect();
                let _ = responder.send(counts);
            }
            ThoughtMessage::Shutdown => return false,
        }
        true
    }

    fn pop_oldest(&mut self) -> Option<Thought> {
        let character = self
            .queues
            .iter()
            .filter_map(|(name, queue)| queue.front().map(|head| (head.seq, name)))
            .min_by_key(|(seq, _)| *seq)
            .map(|(_, name)| name.clone())?;
        let queued = self.queues.get_mut(&character)?.pop_front()?;
        Some(Thought {
            character,
            text: queued.text,
        })
    }
}

// --- Producer ---

/// What one producer cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreloadReport {
    pub generated: usize,
    pub failures: usize,
}

struct ThoughtProducer {
    queue: ThoughtQueue,
    profiles: Vec<CharacterProfile>,
    generator: Arc<dyn ThoughtGenerator>,
    history: HistoryHandle,
    scene: SceneHandle,
    sink: Arc<dyn EventSink>,
    per_character: usize,
    interval: Duration,
    error_backoff: Duration,
    generation_timeout: Duration,
}

impl ThoughtProducer {
    async fn run_cycle(&self) -> Result<PreloadReport, AppError> {
        let counts = self.queue.counts().await?;
        let scene = self.scene.current();
        let recent_history = self
            .history
            .format_recent(THOUGHT_HISTORY_TURNS)
            .unwrap_or_default();

        let mut report = PreloadReport::default();
        for profile in &self.profiles {
            let queued = counts.get(&profile.name).copied().unwrap_or(0);
            for _ in queued..self.per_character {
                match self.generate_one(profile, &scene, &recent_history).await {
                    Ok(text) => {
                        self.sink.record(FlowEvent::HiddenThought {
                            character: profile.name.clone(),
                            thought: text.clone(),
                        });
                        self.queue
                            .store(Thought {
                                character: profile.name.clone(),
                                text,
                            })
                            .await?;
                        report.generated += 1;
                    }
                    Err(e) => {
                        warn!("Skipping thought for {} this cycle: {}", profile.name, e);
                        report.failures += 1;
                        break;
                    }
                }
            }
        }
        Ok(report)
    }

    async fn generate_one(
        &self,
        profile: &CharacterProfile,
        scene: &str,
        recent_history: &str,
    ) -> Result<String, AppError> {
        let request = ThoughtRequest {
            character_name: profile.name.clone(),
            trait_summary: profile.trait_summary(),
            hidden_motive: profile.hidden_motive.clone(),
            scene: scene.to_string(),
            recent_history: recent_history.to_string(),
        };
        let text = timeout(self.generation_timeout, self.generator.generate_thought(request))
            .await??;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::Generation(format!(
                "Empty thought for {}",
                profile.name
            )));
        }
        Ok(text)
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        info!("Thought producer started for {} characters", self.profiles.len());
        loop {
            if *stop.borrow() {
                break;
            }
            let delay = match self.run_cycle().await {
                Ok(report) if report.failures == 0 => self.interval,
                Ok(_) => self.error_backoff,
                Err(AppError::Actor(ActorError::Closed(_))) => break,
                Err(e) => {
                    error!("Error preloading thoughts: {}", e);
                    self.error_backoff
                }
            };
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = sleep(delay) => {}
            }
        }
        info!("Thought producer stopped");
    }
}

/// Owns the thought store and the background producer feeding it.
pub struct ThoughtManager {
    producer: Arc<ThoughtProducer>,
    running: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl ThoughtManager {
    /// Creates the store. The producer does not run until `start` is called.
    pub fn new(
        profiles: Vec<CharacterProfile>,
        generator: Arc<dyn ThoughtGenerator>,
        history: HistoryHandle,
        scene: SceneHandle,
        sink: Arc<dyn EventSink>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self::with_queue(
            ThoughtQueue::spawn(),
            profiles,
            generator,
            history,
            scene,
            sink,
            config,
        )
    }

    /// Like `new`, feeding a store whose handle characters already hold.
    pub fn with_queue(
        queue: ThoughtQueue,
        profiles: Vec<CharacterProfile>,
        generator: Arc<dyn ThoughtGenerator>,
        history: HistoryHandle,
        scene: SceneHandle,
        sink: Arc<dyn EventSink>,
        config: &OrchestratorConfig,
    ) -> Self {
        let producer = ThoughtProducer {
            queue,
            profiles,
            generator,
            history,
            scene,
            sink,
            per_character: config.thought_queue_multiplier,
            interval: config.thought_interval(),
            error_backoff: config.thought_error_backoff(),
            generation_timeout: config.generation_timeout(),
        };
        Self {
            producer: Arc::new(producer),
            running: Mutex::new(None),
        }
    }

    /// Spawns the background producer. Calling it twice is a no-op.
    pub fn start(&self) -> Result<(), AppError> {
        let mut running = self.running.lock()?;
        if running.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let producer = Arc::clone(&self.producer);
        let task = tokio::spawn(producer.run(stop_rx));
        *running = Some((stop_tx, task));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    /// Runs one producer cycle inline.
    #[instrument(skip(self))]
    pub async fn preload_once(&self) -> Result<PreloadReport, AppError> {
        self.producer.run_cycle().await
    }

    /// Non-blocking pop of the oldest queued thought; `None` when empty.
    pub async fn get_next_thought(&self) -> Option<Thought> {
        self.producer.queue.next().await
    }

    /// Takes the oldest thought owned by `character`; `None` if it has none queued.
    pub async fn take_thought_for(&self, character: &str) -> Option<Thought> {
        self.producer.queue.take_for(character).await
    }

    pub async fn queued(&self) -> usize {
        self.producer.queue.len().await
    }

    /// Handle characters use to consume their own thoughts.
    pub fn queue(&self) -> ThoughtQueue {
        self.producer.queue.clone()
    }

    /// The live history thought prompts read from.
    pub fn history(&self) -> HistoryHandle {
        self.producer.history.clone()
    }

    /// Stops the producer, waits for its current cycle to end, then closes the store.
    pub async fn shutdown(&self) {
        let running = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some((stop_tx, task)) = running {
            let _ = stop_tx.send(true);
            if let Err(e) = task.await {
                error!("Thought producer ended abnormally: {}", e);
            }
        }
        self.producer.queue.shutdown().await;
    }
}
