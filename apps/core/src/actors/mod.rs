//! # Actors Module
//!
//! Long-lived tasks and the handles that talk to them.
//!
//! ## Components
//! - `llm`: completion server client and the model-backed thought generator
//! - `thoughts`: per-character thought store and its background producer
//! - `character`: model-backed character with bounded memory
//! - `dispatch`: fixed-size pool running detached character replies
//! - `narrator`: scene opening and optional observations after a turn
//! - `orchestrator`: turn façade over history, policy, thoughts and pool

pub mod character;
pub mod dispatch;
pub mod llm;
pub mod messages;
pub mod narrator;
pub mod orchestrator;
pub mod thoughts;
pub mod traits;
