//! Test Module
//!
//! Scenario tests for the ensemble engine. Unit tests live next to the code
//! they cover; these exercise several components together.
//!
//! ## Test Categories
//! - `mocks`: scripted randomness, characters, model and policy doubles
//! - `flow_tests`: heuristic turn selection, branch by branch
//! - `thought_tests`: producer cycles, per-character queues, lifecycle
//! - `orchestrator_tests`: decisions, fallback, history bounds, dispatch
//! - `roster_tests`: roster validation and lookups
//! - `session_tests`: full user turns with reactions and follow-ups
//! - `chaos_test`: concurrent load and total generation failure


mod orchestrator_tests;
mod session_tests;
