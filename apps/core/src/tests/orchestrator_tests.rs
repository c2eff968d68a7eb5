//! Orchestrator Tests
//!
//! Turn decisions, fallback behaviour, history bounds and detached replies.

use crate::actors::orchestrator::{Orchestrator, FALLBACK_TO_CHARACTER, FALLBACK_TO_USER};
use crate::actors::traits::Character;
use crate::config::{FlowConfig, OrchestratorConfig};
use crate::error::AppError;
use crate::event_log::{FlowEvent, MemorySink};
use crate::flow::conversation_flow::REASON_STARTING;
use crate::flow::TurnPolicy;
use crate::models::TurnDecision;
use crate::roster::Roster;
use crate::tests::mocks::{
    mock_roster, FailingPolicy, FixedPolicy, MockCharacter, MockThoughtGenerator, ScriptedRandom,
};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        thought_interval_ms: 10,
        thought_error_backoff_ms: 10,
        generation_timeout_secs: 1,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator_with(roster: Roster, policy: Arc<dyn TurnPolicy>) -> Orchestrator {
    Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
        .config(test_config())
        .policy(policy)
        .build()
        .unwrap()
}

#[test]
fn test_build_rejects_non_finite_idle_threshold() {
    for value in [f64::INFINITY, f64::NAN] {
        let (roster, _) = mock_roster(&["Alice"]);
        let result = Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
            .flow(FlowConfig {
                idle_time_threshold_secs: value,
                ..FlowConfig::default()
            })
            .build();
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn test_fallback_after_user_turn_picks_first_character() {
    let (roster, _) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FailingPolicy));

    let decision = orchestrator.determine_next_interaction("User", "hi").await;

    assert_eq!(
        decision,
        TurnDecision::new("Alice", "User", FALLBACK_TO_CHARACTER)
    );
    assert!(orchestrator.history().is_empty().unwrap());
}

#[tokio::test]
async fn test_fallback_after_character_turn_awaits_user() {
    let (roster, _) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FailingPolicy));

    let decision = orchestrator.determine_next_interaction("Alice", "hi").await;

    assert_eq!(decision, TurnDecision::new("user", "Alice", FALLBACK_TO_USER));
}

#[tokio::test]
async fn test_fallback_matches_user_case_insensitively() {
    let (roster, _) = mock_roster(&["Bob", "Alice"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FailingPolicy));

    let decision = orchestrator.determine_next_interaction("user", "hi").await;

    assert_eq!(decision, TurnDecision::new("Bob", "User", FALLBACK_TO_CHARACTER));
}

#[tokio::test]
async fn test_unknown_speaker_from_policy_falls_back() {
    let (roster, mocks) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FixedPolicy::new("Mallory", "User")));

    let decision = orchestrator.determine_next_interaction("User", "hi").await;
    orchestrator.shutdown().await;

    assert_eq!(decision.reasoning, FALLBACK_TO_CHARACTER);
    assert!(orchestrator.history().is_empty().unwrap());
    assert!(mocks.iter().all(|m| m.calls() == 0));
}

#[tokio::test]
async fn test_unknown_last_speaker_falls_back() {
    let (roster, _) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FixedPolicy::new("Bob", "ALL")));

    let decision = orchestrator.determine_next_interaction("Stranger", "hi").await;

    assert_eq!(decision, TurnDecision::new("user", "Alice", FALLBACK_TO_USER));
}

// ============================================================================
// Normal path
// ============================================================================

#[tokio::test]
async fn test_decision_records_turn_and_dispatches_reply() {
    let (roster, mocks) = mock_roster(&["Alice", "Bob"]);
    let policy = Arc::new(FixedPolicy::new("Bob", "User"));
    let orchestrator = orchestrator_with(roster, policy.clone());

    let decision = orchestrator
        .determine_next_interaction("User", "\"hello\"")
        .await;
    orchestrator.shutdown().await;

    assert_eq!(decision, TurnDecision::new("Bob", "User", "fixed"));
    assert_eq!(policy.user_notes(), 1);

    let last = orchestrator.history().last().unwrap().unwrap();
    assert_eq!(
        (last.speaker.as_str(), last.target.as_str(), last.message.as_str()),
        ("User", "User", "\"hello\"")
    );

    let bob = &mocks[1];
    assert_eq!(bob.calls(), 1);
    assert_eq!(
        bob.received(),
        vec![("\"hello\"".to_string(), "User".to_string())]
    );
    assert_eq!(mocks[0].calls(), 0);
    assert_eq!(orchestrator.completed_dispatches(), 1);
}

#[tokio::test]
async fn test_user_decision_dispatches_nothing() {
    let (roster, mocks) = mock_roster(&["Alice", "Bob"]);
    let policy = Arc::new(FixedPolicy::new("user", "Alice"));
    let orchestrator = orchestrator_with(roster, policy.clone());

    orchestrator.determine_next_interaction("Alice", "Lovely night.").await;
    orchestrator.shutdown().await;

    assert_eq!(policy.user_notes(), 0);
    assert_eq!(orchestrator.history().len().unwrap(), 1);
    assert!(mocks.iter().all(|m| m.calls() == 0));
}

#[tokio::test]
async fn test_policy_sees_history_before_current_turn() {
    let (roster, _) = mock_roster(&["Alice", "Bob"]);
    let policy = Arc::new(FixedPolicy::new("user", "Alice"));
    let orchestrator = orchestrator_with(roster, policy.clone());
    orchestrator.record_turn("Alice", "Bob", "First").unwrap();

    orchestrator.determine_next_interaction("Bob", "Second").await;

    let seen = policy.seen();
    assert_eq!(seen.len(), 1);
    let context = &seen[0];
    assert_eq!(context.last_event.as_ref().unwrap().message, "First");
    assert_eq!(context.active_characters, vec!["Bob".to_string()]);
    assert_eq!(context.last_speaker, "Bob");
    assert_eq!(context.recent_history.len(), 1);
}

#[tokio::test]
async fn test_same_topic_sets_avoid_similar_hint() {
    let (roster, mocks) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FixedPolicy::new("Bob", "Alice")));
    orchestrator
        .record_turn("Alice", "Bob", "I found a journal")
        .unwrap();

    orchestrator
        .determine_next_interaction("Alice", "Did you examine the journal?")
        .await;
    orchestrator.shutdown().await;

    assert!(mocks[1].last_context().unwrap().avoid_similar_response);
}

#[tokio::test]
async fn test_own_earlier_turn_does_not_set_hint() {
    let (roster, mocks) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FixedPolicy::new("Bob", "Alice")));
    orchestrator
        .record_turn("Bob", "Alice", "I found a journal")
        .unwrap();

    orchestrator
        .determine_next_interaction("Alice", "Did you examine the journal?")
        .await;
    orchestrator.shutdown().await;

    assert!(!mocks[1].last_context().unwrap().avoid_similar_response);
}

#[tokio::test]
async fn test_default_flow_opens_with_scripted_character() {
    let (roster, _) = mock_roster(&["Alice", "Bob"]);
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
        .config(test_config())
        .random(Arc::new(ScriptedRandom::new().indices([1])))
        .sink(sink.clone())
        .build()
        .unwrap();

    let decision = orchestrator.determine_next_interaction("User", "hello").await;
    orchestrator.shutdown().await;

    assert_eq!(decision, TurnDecision::new("Bob", "ALL", REASON_STARTING));
    let kinds: Vec<&str> = sink.events().iter().map(|e| e.event.kind()).collect();
    assert_eq!(kinds, vec!["dialogue", "flow_decision"]);
    assert_eq!(
        sink.of_kind("flow_decision")[0],
        FlowEvent::FlowDecision {
            last_speaker: "User".to_string(),
            next_speaker: "Bob".to_string(),
            target: "ALL".to_string(),
            reasoning: REASON_STARTING.to_string(),
        }
    );
}

// ============================================================================
// History and eligibility
// ============================================================================

#[tokio::test]
async fn test_history_never_exceeds_bound() {
    let (roster, _) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
        .config(OrchestratorConfig {
            max_history_length: 3,
            ..test_config()
        })
        .policy(Arc::new(FixedPolicy::new("user", "Alice")))
        .build()
        .unwrap();

    for i in 0..10 {
        if i % 2 == 0 {
            orchestrator
                .record_turn("Alice", "Bob", &format!("line {}", i))
                .unwrap();
        } else {
            orchestrator
                .determine_next_interaction("Bob", &format!("line {}", i))
                .await;
        }
        assert!(orchestrator.history().len().unwrap() <= 3);
    }
    let snapshot = orchestrator.history().snapshot().unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[2].message, "line 9");
}

#[tokio::test]
async fn test_record_turn_rejects_unknown_participants() {
    let (roster, _) = mock_roster(&["Alice"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FailingPolicy));

    assert!(matches!(
        orchestrator.record_turn("Mallory", "ALL", "hi"),
        Err(AppError::UnknownParticipant(name)) if name == "Mallory"
    ));
    assert!(orchestrator.record_turn("Alice", "Ghost", "hi").is_err());
    assert!(orchestrator.record_turn("USER", "Alice", "hi").is_ok());
    assert!(orchestrator.record_turn("Alice", "ALL", "hi").is_ok());
}

#[tokio::test]
async fn test_active_characters_skip_recent_speakers_and_excluded() {
    let (roster, _) = mock_roster(&["Alice", "Bob", "Carol", "Dave"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FailingPolicy));
    orchestrator.record_turn("Carol", "ALL", "old").unwrap();
    orchestrator.record_turn("Alice", "ALL", "one").unwrap();
    orchestrator.record_turn("User", "Alice", "two").unwrap();
    orchestrator.record_turn("Bob", "User", "three").unwrap();

    assert_eq!(
        orchestrator.active_characters(&[]).unwrap(),
        vec!["Carol".to_string(), "Dave".to_string()]
    );
    assert_eq!(
        orchestrator.active_characters(&["Dave"]).unwrap(),
        vec!["Carol".to_string()]
    );
}

// ============================================================================
// Opening line and thoughts
// ============================================================================

#[tokio::test]
async fn test_initial_response_comes_from_random_character() {
    let (roster, mocks) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
        .config(test_config())
        .random(Arc::new(ScriptedRandom::new().indices([1])))
        .build()
        .unwrap();

    let reply = orchestrator.get_initial_character_response().await;

    assert_eq!(reply, "[Bob]: re SCENE_START");
    assert_eq!(
        mocks[1].received(),
        vec![("SCENE_START".to_string(), "ALL".to_string())]
    );
    let last = orchestrator.history().last().unwrap().unwrap();
    assert_eq!((last.speaker.as_str(), last.target.as_str()), ("Bob", "ALL"));
}

#[tokio::test]
async fn test_initial_response_falls_back_on_timeout() {
    let slow: Arc<dyn Character> =
        Arc::new(MockCharacter::named("Slow").with_delay(Duration::from_secs(3)));
    let roster = Roster::new(vec![slow]).unwrap();
    let orchestrator = orchestrator_with(roster, Arc::new(FailingPolicy));

    let reply = orchestrator.get_initial_character_response().await;

    assert_eq!(reply, "[Slow]: *looks around curiously*");
    assert!(orchestrator.history().is_empty().unwrap());
}

#[tokio::test]
async fn test_next_thought_after_preload() {
    let (roster, _) = mock_roster(&["Alice", "Bob"]);
    let orchestrator = orchestrator_with(roster, Arc::new(FailingPolicy));

    assert!(orchestrator.get_next_thought().await.is_none());
    orchestrator.thoughts().preload_once().await.unwrap();

    let thought = orchestrator.get_next_thought().await.unwrap();
    assert_eq!(thought.character, "Alice");
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let (roster, _) = mock_roster(&["Alice"]);
    let result = Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
        .config(OrchestratorConfig {
            max_history_length: 0,
            ..OrchestratorConfig::default()
        })
        .build();
    assert!(matches!(result, Err(AppError::Validation(_))));
}
