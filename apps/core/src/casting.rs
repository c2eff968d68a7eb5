//! Casting
//!
//! Model-generated scenarios and character rosters. Both always produce a
//! usable result: a malformed or failed generation falls back to built-in
//! scenarios and to `default_profiles`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::actors::character::UserIdentity;
use crate::actors::narrator::NARRATOR;
use crate::actors::traits::LlmActor;
use crate::error::AppError;
use crate::flow::director::clean_json_response;
use crate::models::{is_user, CharacterProfile, EVERYONE};
use crate::random::RandomSource;
use crate::roster::default_profiles;

const SCENARIO_TEMPERATURE: f32 = 0.9;
const CAST_TEMPERATURE: f32 = 0.7;

/// Scene text plus hints for casting and for the user's part in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub description: String,
    pub character_context: String,
    pub user_role: String,
}

impl Scenario {
    fn builtin(description: &str, character_context: &str, user_role: &str) -> Self {
        Self {
            description: description.to_string(),
            character_context: character_context.to_string(),
            user_role: user_role.to_string(),
        }
    }
}

/// Scenarios used when generation fails.
pub fn fallback_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::builtin(
            "A mysterious tavern on a stormy night. Travelers from different walks of life \
             have sought shelter here, each carrying their own secrets and stories. The \
             atmosphere is tense with unspoken tales and hidden agendas.",
            "Travelers, innkeeper, mysterious stranger",
            "A curious traveler seeking shelter from the storm",
        ),
        Scenario::builtin(
            "An abandoned mansion during a masquerade ball. The guests are trapped inside by \
             a mysterious force, and everyone seems to have a hidden agenda. The air is thick \
             with intrigue and suspicion.",
            "Noble guests, servants, mysterious host",
            "An invited guest at the masquerade",
        ),
        Scenario::builtin(
            "A futuristic space station at the edge of known space. The station's systems are \
             malfunctioning, and the crew members each seem to know more than they're letting \
             on. The metallic corridors echo with whispered conspiracies.",
            "Station crew, engineers, security personnel",
            "A newly arrived passenger with vital information",
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct ScenarioDraft {
    setting: String,
    situation: String,
    atmosphere: String,
    #[serde(default)]
    character_context: String,
    #[serde(default)]
    user_role: String,
}

impl ScenarioDraft {
    fn into_scenario(self) -> Result<Scenario, AppError> {
        let setting = self.setting.trim().trim_end_matches('.');
        let situation = self.situation.trim();
        let atmosphere = self.atmosphere.trim();
        if setting.is_empty() || situation.is_empty() || atmosphere.is_empty() {
            return Err(AppError::Parse("Scenario has an empty section".to_string()));
        }

        let user_role = self.user_role.trim().to_string();
        let mut description = format!("{}. {} {}", setting, situation, atmosphere);
        if !user_role.is_empty() {
            description.push_str(&format!("\n\nYour role: {}", user_role));
        }
        Ok(Scenario {
            description,
            character_context: self.character_context.trim().to_string(),
            user_role,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CastDraft {
    characters: Vec<CharacterProfile>,
}

/// Generates scenarios and rosters through the language model.
pub struct Casting {
    llm: Arc<dyn LlmActor>,
    random: Arc<dyn RandomSource>,
    generation_timeout: Duration,
}

impl Casting {
    pub fn new(
        llm: Arc<dyn LlmActor>,
        random: Arc<dyn RandomSource>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            random,
            generation_timeout,
        }
    }

    /// A generated scenario, or a random built-in one.
    #[instrument(skip_all)]
    pub async fn scenario(&self, user: Option<&UserIdentity>) -> Scenario {
        match self.try_scenario(user).await {
            Ok(scenario) => scenario,
            Err(e) => {
                warn!("Scenario generation failed, using a built-in one: {}", e);
                self.fallback_scenario()
            }
        }
    }

    pub fn fallback_scenario(&self) -> Scenario {
        let mut scenarios = fallback_scenarios();
        let pick = self.random.pick_index(scenarios.len());
        scenarios.swap_remove(pick)
    }

    async fn try_scenario(&self, user: Option<&UserIdentity>) -> Result<Scenario, AppError> {
        let raw = self
            .generate(build_scenario_prompt(user), SCENARIO_TEMPERATURE)
            .await?;
        let draft: ScenarioDraft = serde_json::from_str(&clean_json_response(&raw))?;
        draft.into_scenario()
    }

    /// Up to `count` generated characters for `scene`, or `default_profiles`.
    #[instrument(skip(self, scene, character_context, user))]
    pub async fn cast(
        &self,
        scene: &str,
        character_context: &str,
        user: Option<&UserIdentity>,
        count: usize,
    ) -> Vec<CharacterProfile> {
        match self.try_cast(scene, character_context, user, count).await {
            Ok(profiles) => {
                info!(
                    "Cast {} characters: {:?}",
                    profiles.len(),
                    profiles.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
                );
                profiles
            }
            Err(e) => {
                warn!("Character generation failed, using the default cast: {}", e);
                default_profiles()
            }
        }
    }

    async fn try_cast(
        &self,
        scene: &str,
        character_context: &str,
        user: Option<&UserIdentity>,
        count: usize,
    ) -> Result<Vec<CharacterProfile>, AppError> {
        let prompt = build_cast_prompt(scene, character_context, user, count);
        let raw = self.generate(prompt, CAST_TEMPERATURE).await?;
        let draft: CastDraft = serde_json::from_str(&clean_json_response(&raw))?;

        let mut profiles = draft.characters;
        profiles.truncate(count);
        if profiles.is_empty() {
            return Err(AppError::Parse("No characters in reply".to_string()));
        }

        let mut seen = HashSet::new();
        for profile in &mut profiles {
            profile.name = profile.name.trim().to_string();
            profile.check()?;
            let name = profile.name.as_str();
            if is_user(name) || name == EVERYONE || name == NARRATOR {
                return Err(AppError::Validation(format!("Reserved character name: {}", name)));
            }
            if user.is_some_and(|u| u.name.eq_ignore_ascii_case(name)) {
                return Err(AppError::Validation(format!(
                    "Character {} shares the user's name",
                    name
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(AppError::Validation(format!("Duplicate character: {}", name)));
            }
        }
        Ok(profiles)
    }

    async fn generate(&self, prompt: String, temperature: f32) -> Result<String, AppError> {
        timeout(
            self.generation_timeout,
            self.llm.generate_with_params(prompt, None, Some(temperature)),
        )
        .await?
    }
}

fn build_scenario_prompt(user: Option<&UserIdentity>) -> String {
    let user_line = match user {
        Some(user) if !user.description.is_empty() => format!(
            "The user plays {}, {}. Give them a fitting role.\n\n",
            user.name, user.description
        ),
        Some(user) => format!("The user plays {}. Give them a fitting role.\n\n", user.name),
        None => String::new(),
    };
    format!(
        "Generate an interesting and dramatic scenario for an interactive play. It needs to \
         be captivating and fun for the user. Be free and creative, but keep it realistic \
         and coherent.\n\n\
         {user_line}\
         Return ONLY a JSON object in this exact format:\n\
         {{\n\
         \"setting\": \"description of the location\",\n\
         \"situation\": \"description of what's happening\",\n\
         \"atmosphere\": \"description of mood and environment\",\n\
         \"character_context\": \"kinds of characters present\",\n\
         \"user_role\": \"the user's part in the scene\"\n\
         }}"
    )
}

fn build_cast_prompt(
    scene: &str,
    character_context: &str,
    user: Option<&UserIdentity>,
    count: usize,
) -> String {
    let mut description = scene.to_string();
    if !character_context.is_empty() {
        description.push_str(&format!("\n\nExpected characters: {}", character_context));
    }
    let user_line = user
        .map(|u| format!("The user's character is {} and must not be one of them.\n", u.name))
        .unwrap_or_default();
    format!(
        "Based on this scene description: {description}\n\
         Create exactly {count} distinct characters that would make an interesting dynamic.\n\
         {user_line}\n\
         Return ONLY a JSON object with this EXACT format (no additional text or formatting):\n\
         {{\n\
         \"characters\": [\n\
         {{\n\
         \"name\": \"string\",\n\
         \"gender\": \"male/female/non-binary\",\n\
         \"personality\": {{\"trait1\": 0.5, \"trait2\": 0.5, \"trait3\": 0.5}},\n\
         \"background\": \"string\",\n\
         \"hidden_motive\": \"string\"\n\
         }}\n\
         ]\n\
         }}\n\n\
         Rules:\n\
         - Each trait value must be a float between 0 and 1\n\
         - Gender must be exactly \"male\", \"female\", or \"non-binary\"\n\
         - Exactly {count} characters in the array"
    )
}
