//! Event Log
//!
//! Structured, fire-and-forget observability events emitted by the engine.
//! A sink never influences the conversation: the core runs the same with
//! `NoopSink` as with any other sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

/// An observable engine event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    /// A turn was recorded in the history.
    Dialogue {
        speaker: String,
        target: String,
        message: String,
    },
    /// The orchestrator chose the next speaker.
    FlowDecision {
        last_speaker: String,
        next_speaker: String,
        target: String,
        reasoning: String,
    },
    /// A hidden thought was generated for a character.
    HiddenThought { character: String, thought: String },
    /// The narrator set the scene or observed a turn.
    Narration { kind: NarrationKind, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationKind {
    Scene,
    Observation,
}

impl FlowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowEvent::Dialogue { .. } => "dialogue",
            FlowEvent::FlowDecision { .. } => "flow_decision",
            FlowEvent::HiddenThought { .. } => "hidden_thought",
            FlowEvent::Narration { .. } => "narration",
        }
    }
}

/// Receives engine events.
pub trait EventSink: Send + Sync + 'static {
    fn record(&self, event: FlowEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: FlowEvent) {}
}

/// Emits each event as a structured `tracing` event on the `ensemble::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: FlowEvent) {
        match &event {
            FlowEvent::Dialogue {
                speaker,
                target,
                message,
            } => info!(target: "ensemble::events", kind = "dialogue", %speaker, %target, %message),
            FlowEvent::FlowDecision {
                last_speaker,
                next_speaker,
                target,
                reasoning,
            } => info!(
                target: "ensemble::events",
                kind = "flow_decision",
                %last_speaker,
                %next_speaker,
                %target,
                %reasoning
            ),
            FlowEvent::HiddenThought { character, thought } => {
                info!(target: "ensemble::events", kind = "hidden_thought", %character, %thought)
            }
            FlowEvent::Narration { kind, text } => {
                info!(target: "ensemble::events", kind = "narration", narration = ?kind, %text)
            }
        }
    }
}

/// A timestamped event held by `MemorySink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: FlowEvent,
}

/// Events a `MemorySink` keeps before dropping the oldest.
pub const MEMORY_SINK_CAPACITY: usize = 1024;

/// In-memory sink for tests and debugging. Keeps the most recent events in
/// arrival order, dropping the oldest beyond its capacity.
#[derive(Debug, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<LoggedEvent>>>,
    capacity: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::with_capacity(MEMORY_SINK_CAPACITY)
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events of one kind, e.g. `"dialogue"`.
    pub fn of_kind(&self, kind: &str) -> Vec<FlowEvent> {
        self.events()
            .into_iter()
            .map(|logged| logged.event)
            .filter(|event| event.kind() == kind)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: FlowEvent) {
        if let Ok(mut events) = self.events.lock() {
            if events.len() == self.capacity {
                events.pop_front();
            }
            events.push_back(LoggedEvent {
                timestamp: Utc::now(),
                event,
            });
        }
    }
}
