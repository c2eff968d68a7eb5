// Ensemble Entry Point
// Line-oriented play session against a llama.cpp-compatible completion server.

use anyhow::{Context, Result};
use dotenv::dotenv;
use ensemble_core::actors::character::{LlmCharacter, UserIdentity};
use ensemble_core::actors::llm::{LlmActorHandle, LlmThoughtGenerator};
use ensemble_core::actors::thoughts::ThoughtQueue;
use ensemble_core::actors::traits::{Character, LlmActor};
use ensemble_core::casting::Casting;
use ensemble_core::event_log::TracingSink;
use ensemble_core::flow::LlmFlowDirector;
use ensemble_core::random::ThreadRandom;
use ensemble_core::roster::{load_profiles, Roster};
use ensemble_core::scene::SceneHandle;
use ensemble_core::telemetry::init_tracing;
use ensemble_core::{EngineConfig, Orchestrator, PlaySession};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format)?;

    let session_id = Uuid::new_v4();
    run(config)
        .instrument(info_span!("session", %session_id))
        .await
}

async fn run(config: EngineConfig) -> Result<()> {
    let user = env::var("ENSEMBLE_USER_NAME").ok().map(|name| UserIdentity {
        name,
        description: env::var("ENSEMBLE_USER_DESCRIPTION").unwrap_or_default(),
    });

    let llm: Arc<dyn LlmActor> = Arc::new(LlmActorHandle::new(config.llm.clone()));
    let timeout = config.orchestrator.generation_timeout();
    let casting = Casting::new(Arc::clone(&llm), Arc::new(ThreadRandom), timeout);

    let (scene_text, character_context) = match env::var("ENSEMBLE_SCENE") {
        Ok(scene) => (scene, String::new()),
        Err(_) => {
            let scenario = casting.scenario(user.as_ref()).await;
            (scenario.description, scenario.character_context)
        }
    };
    let profiles = match env::var("ENSEMBLE_ROSTER") {
        Ok(path) => load_profiles(&PathBuf::from(path))?,
        Err(_) => {
            casting
                .cast(
                    &scene_text,
                    &character_context,
                    user.as_ref(),
                    config.character_count,
                )
                .await
        }
    };

    let thoughts = ThoughtQueue::spawn();

    let mut members: Vec<Arc<dyn Character>> = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let mut character =
            LlmCharacter::new(profile, Arc::clone(&llm), thoughts.clone(), timeout)?;
        if let Some(user) = &user {
            character = character.with_user(user.clone());
        }
        members.push(Arc::new(character));
    }
    let roster = Roster::new(members)?;

    let scene = SceneHandle::default();
    let mut builder = Orchestrator::builder(
        roster.clone(),
        Arc::new(LlmThoughtGenerator::new(Arc::clone(&llm))),
    )
    .config(config.orchestrator.clone())
    .flow(config.flow.clone())
    .scene(scene.clone())
    .sink(Arc::new(TracingSink))
    .thought_queue(thoughts);

    if env::var("ENSEMBLE_POLICY").is_ok_and(|p| p.eq_ignore_ascii_case("llm")) {
        info!("Using the model-driven turn policy");
        builder = builder.policy(Arc::new(LlmFlowDirector::new(
            Arc::clone(&llm),
            &roster,
            scene.clone(),
            timeout,
        )));
    }

    let session = PlaySession::new(builder.build()?).with_narrator(Arc::clone(&llm));
    for utterance in session.start(&scene_text).await? {
        println!("{}\n", utterance.text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "quit" | "exit") {
            break;
        }
        for utterance in session.process_user_input(input).await? {
            println!("{}", utterance.text);
        }
    }

    session.shutdown().await;
    info!("Session ended");
    Ok(())
}
