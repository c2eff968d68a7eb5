//! Ensemble core: turn-taking engine for multi-character conversations.
//!
//! A roster of characters shares a bounded conversation history with a human
//! participant. On every step the [`Orchestrator`] asks a [`flow::TurnPolicy`]
//! who speaks next, records the turn and hands the chosen character its line,
//! while a background [`actors::thoughts::ThoughtManager`] keeps each character
//! supplied with hidden thoughts.

pub mod actors;
pub mod brain;
pub mod casting;
pub mod config;
pub mod error;
pub mod event_log;
pub mod flow;
pub mod history;
pub mod models;
pub mod random;
pub mod roster;
pub mod scene;
pub mod session;
pub mod telemetry;

pub use actors::orchestrator::{Orchestrator, OrchestratorBuilder};
pub use config::EngineConfig;
pub use error::AppError;
pub use session::PlaySession;

#[cfg(test)]
mod tests;
