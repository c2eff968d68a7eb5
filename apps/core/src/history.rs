//! Bounded, order-preserving conversation history shared across tasks.
//!
//! The orchestrator is the only writer by convention; the turn policy and the
//! thought producer read snapshots and tolerate one being a turn stale.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::error::AppError;
use crate::models::ConversationEvent;

/// The most recent turns, oldest first, never longer than `max_len`.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    events: VecDeque<ConversationEvent>,
    max_len: usize,
}

impl ConversationHistory {
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            events: VecDeque::with_capacity(max_len + 1),
            max_len,
        }
    }

    /// Appends a turn, evicting the oldest ones past capacity.
    pub fn push(&mut self, event: ConversationEvent) {
        self.events.push_back(event);
        while self.events.len() > self.max_len {
            self.events.pop_front();
        }
    }

    pub fn last(&self) -> Option<&ConversationEvent> {
        self.events.back()
    }

    /// Up to `n` latest turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ConversationEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationEvent> {
        self.events.iter()
    }
}

/// Cloneable shared reference to a `ConversationHistory`.
#[derive(Debug, Clone)]
pub struct HistoryHandle {
    inner: Arc<RwLock<ConversationHistory>>,
}

impl HistoryHandle {
    pub fn new(max_len: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ConversationHistory::new(max_len))),
        }
    }

    /// Records a turn and returns the stored event.
    pub fn record(&self, event: ConversationEvent) -> Result<ConversationEvent, AppError> {
        let mut history = self.inner.write()?;
        history.push(event.clone());
        Ok(event)
    }

    pub fn last(&self) -> Result<Option<ConversationEvent>, AppError> {
        Ok(self.inner.read()?.last().cloned())
    }

    pub fn recent(&self, n: usize) -> Result<Vec<ConversationEvent>, AppError> {
        Ok(self.inner.read()?.recent(n))
    }

    pub fn snapshot(&self) -> Result<Vec<ConversationEvent>, AppError> {
        Ok(self.inner.read()?.iter().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, AppError> {
        Ok(self.inner.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.inner.read()?.is_empty())
    }

    /// The last `n` turns as "speaker to target: message" lines.
    pub fn format_recent(&self, n: usize) -> Result<String, AppError> {
        Ok(self
            .recent(n)?
            .iter()
            .map(ConversationEvent::as_line)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
