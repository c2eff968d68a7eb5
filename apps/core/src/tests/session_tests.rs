//! Play Session Tests
//!
//! End-to-end user turns over mock characters with scripted randomness.

use crate::actors::orchestrator::Orchestrator;
use crate::config::OrchestratorConfig;
use crate::error::AppError;
use crate::event_log::{FlowEvent, MemorySink, NarrationKind};
use crate::flow::TurnPolicy;
use crate::models::Utterance;
use crate::session::{PlaySession, PROMPT_USER};
use crate::tests::mocks::{
    mock_roster, FixedPolicy, MockCharacter, MockLlmActor, MockThoughtGenerator, ScriptedRandom,
};
use std::sync::Arc;

fn session(
    names: &[&str],
    policy: Arc<dyn TurnPolicy>,
    random: ScriptedRandom,
    config: OrchestratorConfig,
) -> (PlaySession, Vec<Arc<MockCharacter>>) {
    let (roster, mocks) = mock_roster(names);
    let orchestrator = Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
        .config(config)
        .policy(policy)
        .random(Arc::new(random))
        .build()
        .unwrap();
    (PlaySession::new(orchestrator), mocks)
}

fn quick_config() -> OrchestratorConfig {
    OrchestratorConfig {
        thought_interval_ms: 10,
        thought_error_backoff_ms: 10,
        generation_timeout_secs: 1,
        ..OrchestratorConfig::default()
    }
}

fn lines(utterances: &[Utterance]) -> Vec<(&str, &str)> {
    utterances
        .iter()
        .map(|u| (u.speaker.as_str(), u.target.as_str()))
        .collect()
}

#[tokio::test]
async fn test_input_before_start_is_rejected() {
    let (session, _) = session(
        &["Alice", "Bob"],
        Arc::new(FixedPolicy::new("Bob", "User")),
        ScriptedRandom::new(),
        quick_config(),
    );

    let result = session.process_user_input("hello").await;
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[tokio::test]
async fn test_start_sets_scene_and_opens() {
    let (session, mocks) = session(
        &["Alice", "Bob"],
        Arc::new(FixedPolicy::new("Bob", "User")),
        ScriptedRandom::new().indices([1]),
        quick_config(),
    );

    let opening = session.start("A lighthouse in a storm").await.unwrap();

    assert!(session.is_started());
    assert_eq!(opening.len(), 1);
    let opening = &opening[0];
    assert_eq!(opening.speaker, "Bob");
    assert_eq!(opening.target, "ALL");
    assert_eq!(opening.text, "[Bob]: re SCENE_START");
    assert_eq!(
        mocks[1].last_context().unwrap().scene,
        "A lighthouse in a storm"
    );
    assert!(session.orchestrator().thoughts().is_running());
    session.shutdown().await;
}

#[tokio::test]
async fn test_user_turn_produces_reply_reactions_followup_and_prompt() {
    // opening: Alice; reactions: two, Alice then Carol; Carol's reaction gets a
    // follow-up; Carol asks the closing question.
    let (session, _) = session(
        &["Alice", "Bob", "Carol"],
        Arc::new(FixedPolicy::new("Bob", "User")),
        ScriptedRandom::always(0.9)
            .indices([0, 1, 0, 0, 2])
            .floats([0.5, 0.1]),
        quick_config(),
    );
    session.start("A tavern").await.unwrap();

    let utterances = session.process_user_input("  'hello'  ").await.unwrap();
    session.shutdown().await;

    assert_eq!(
        lines(&utterances),
        vec![
            ("Bob", "User"),
            ("Alice", "Bob"),
            ("Carol", "Bob"),
            ("Bob", "Carol"),
            ("Carol", "User"),
        ]
    );
    assert_eq!(utterances[0].text, "[Bob]: re \"hello\"");
    assert_eq!(utterances[1].text, "[Alice]: re [Bob]: re \"hello\"");
    assert_eq!(
        utterances[4].text,
        format!("[Carol]: re {}", PROMPT_USER)
    );

    let history = session.orchestrator().history().snapshot().unwrap();
    assert_eq!(history.len(), 7);
    assert_eq!(history[1].speaker, "User");
    assert_eq!(history[1].message, "\"hello\"");
}

#[tokio::test]
async fn test_user_held_turn_still_gets_an_answer() {
    let (session, _) = session(
        &["Alice", "Bob"],
        Arc::new(FixedPolicy::new("user", "Alice")),
        ScriptedRandom::always(0.9).indices([0, 1, 0, 0]),
        OrchestratorConfig {
            max_reactions: 1,
            ..quick_config()
        },
    );
    session.start("A tavern").await.unwrap();

    let utterances = session.process_user_input("hello").await.unwrap();
    session.shutdown().await;

    assert_eq!(
        lines(&utterances),
        vec![("Bob", "User"), ("Alice", "Bob"), ("Alice", "User")]
    );
}

#[tokio::test]
async fn test_lone_character_has_nobody_to_react() {
    let (session, _) = session(
        &["Alice"],
        Arc::new(FixedPolicy::new("Alice", "User")),
        ScriptedRandom::always(0.0),
        quick_config(),
    );
    session.start("A tavern").await.unwrap();

    let utterances = session.process_user_input("hello").await.unwrap();
    session.shutdown().await;

    assert_eq!(lines(&utterances), vec![("Alice", "User"), ("Alice", "User")]);
}

#[tokio::test]
async fn test_history_stays_bounded_across_many_turns() {
    let (session, _) = session(
        &["Alice", "Bob", "Carol"],
        Arc::new(FixedPolicy::new("Alice", "User")),
        ScriptedRandom::always(0.0),
        OrchestratorConfig {
            max_history_length: 4,
            ..quick_config()
        },
    );
    session.start("A tavern").await.unwrap();

    for turn in 0..5 {
        session
            .process_user_input(&format!("turn {}", turn))
            .await
            .unwrap();
        assert!(session.orchestrator().history().len().unwrap() <= 4);
    }
    session.shutdown().await;
}

#[tokio::test]
async fn test_input_after_shutdown_is_rejected() {
    let (session, _) = session(
        &["Alice", "Bob"],
        Arc::new(FixedPolicy::new("Bob", "User")),
        ScriptedRandom::new(),
        quick_config(),
    );
    session.start("A tavern").await.unwrap();
    session.shutdown().await;

    assert!(session.process_user_input("hello").await.is_err());
    assert!(!session.orchestrator().thoughts().is_running());
}

fn narrated_session(
    names: &[&str],
    narration: &str,
    random: ScriptedRandom,
) -> (PlaySession, Arc<MemorySink>) {
    let (roster, _) = mock_roster(names);
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::builder(roster, Arc::new(MockThoughtGenerator::ok()))
        .config(OrchestratorConfig {
            max_reactions: 1,
            ..quick_config()
        })
        .policy(Arc::new(FixedPolicy::new("Bob", "User")))
        .random(Arc::new(random))
        .sink(sink.clone())
        .build()
        .unwrap();
    let narrator_llm = Arc::new(MockLlmActor::replying(Ok(narration.to_string())));
    let session = PlaySession::new(orchestrator).with_narrator(narrator_llm);
    (session, sink)
}

#[tokio::test]
async fn test_narrator_opens_before_first_character() {
    let (session, sink) = narrated_session(
        &["Alice", "Bob"],
        "SKIP",
        ScriptedRandom::always(0.9).indices([1]),
    );

    let opening = session.start("A lighthouse in a storm").await.unwrap();
    session.shutdown().await;

    assert_eq!(
        lines(&opening),
        vec![("Narrator", "ALL"), ("Bob", "ALL")]
    );
    assert_eq!(opening[0].text, "[Narrator]: A lighthouse in a storm");
    assert_eq!(session.orchestrator().scene().current(), "A lighthouse in a storm");
    assert!(sink.of_kind("narration").contains(&FlowEvent::Narration {
        kind: NarrationKind::Scene,
        text: "A lighthouse in a storm".to_string(),
    }));
}

#[tokio::test]
async fn test_narrator_observes_before_the_closing_question() {
    // opening: Alice; one reaction by Alice, no follow-up; Alice asks the user.
    let (session, sink) = narrated_session(
        &["Alice", "Bob"],
        "The lamp gutters in the draft.",
        ScriptedRandom::always(0.9).indices([0, 0, 0, 0]),
    );
    session.start("A lighthouse").await.unwrap();

    let utterances = session.process_user_input("hello").await.unwrap();
    session.shutdown().await;

    assert_eq!(
        lines(&utterances),
        vec![
            ("Bob", "User"),
            ("Alice", "Bob"),
            ("Narrator", "ALL"),
            ("Alice", "User"),
        ]
    );
    assert_eq!(utterances[2].text, "[Narrator]: The lamp gutters in the draft.");
    let history = session.orchestrator().history().snapshot().unwrap();
    assert!(history.iter().all(|event| event.speaker != "Narrator"));
    assert_eq!(sink.of_kind("narration").len(), 2);
}

#[tokio::test]
async fn test_skipped_narration_adds_no_line() {
    let (session, _) = narrated_session(
        &["Alice", "Bob"],
        "SKIP",
        ScriptedRandom::always(0.9).indices([0, 0, 0, 0]),
    );
    session.start("A lighthouse").await.unwrap();

    let utterances = session.process_user_input("hello").await.unwrap();
    session.shutdown().await;

    assert!(utterances.iter().all(|u| u.speaker != "Narrator"));
    assert_eq!(utterances.len(), 3);
}
