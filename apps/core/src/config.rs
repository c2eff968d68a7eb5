//! Engine configuration.
//!
//! Every probability and timing used by the turn-taking engine lives here as a
//! named, validated field. `EngineConfig::from_env` reads `ENSEMBLE_*` variables
//! (after `dotenv` has populated the environment) on top of the defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::AppError;

/// Parameters of the heuristic turn-selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FlowConfig {
    /// Seconds without user input before characters may speak unprompted.
    #[validate(range(min = 0.0), custom(function = "validate_finite"))]
    pub idle_time_threshold_secs: f64,
    /// Chance an idle conversation is restarted by a character.
    #[validate(range(min = 0.0, max = 1.0))]
    pub initiation_chance: f64,
    /// Chance a question addressed to the user hands the turn to the user.
    #[validate(range(min = 0.0, max = 1.0))]
    pub user_response_chance: f64,
    /// Chance a directly addressed character answers.
    #[validate(range(min = 0.0, max = 1.0))]
    pub direct_response_chance: f64,
    /// Chance an initiating character addresses the user rather than another character.
    #[validate(range(min = 0.0, max = 1.0))]
    pub initiate_toward_user_chance: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            idle_time_threshold_secs: 45.0,
            initiation_chance: 0.2,
            user_response_chance: 0.9,
            direct_response_chance: 0.9,
            initiate_toward_user_chance: 0.6,
        }
    }
}

impl FlowConfig {
    /// Saturates instead of panicking when the config skipped validation.
    pub fn idle_time_threshold(&self) -> Duration {
        Duration::try_from_secs_f64(self.idle_time_threshold_secs).unwrap_or(Duration::MAX)
    }
}

/// Rejects `inf` and `NaN`, which `range` lets through.
fn validate_finite(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new("not_finite"))
    }
}

/// Parameters of the orchestrator, its thought producer and its dispatch pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct OrchestratorConfig {
    /// Maximum number of turns kept in the conversation history.
    #[validate(range(min = 1))]
    pub max_history_length: usize,
    /// Target number of queued thoughts per character.
    #[validate(range(min = 1))]
    pub thought_queue_multiplier: usize,
    /// Pause between producer cycles.
    #[validate(range(min = 1))]
    pub thought_interval_ms: u64,
    /// Pause after a cycle in which a generation failed.
    #[validate(range(min = 1))]
    pub thought_error_backoff_ms: u64,
    /// Upper bound on any single model call.
    #[validate(range(min = 1))]
    pub generation_timeout_secs: u64,
    /// Pending character responses the dispatch pool buffers.
    #[validate(range(min = 1))]
    pub dispatch_queue_capacity: usize,
    /// Chance a reacting character draws a follow-up from the primary speaker.
    #[validate(range(min = 0.0, max = 1.0))]
    pub reaction_followup_chance: f64,
    /// Upper bound on reactions after a primary reply.
    pub max_reactions: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_history_length: 10,
            thought_queue_multiplier: 2,
            thought_interval_ms: 1000,
            thought_error_backoff_ms: 5000,
            generation_timeout_secs: 30,
            dispatch_queue_capacity: 32,
            reaction_followup_chance: 0.2,
            max_reactions: 2,
        }
    }
}

impl OrchestratorConfig {
    pub fn thought_interval(&self) -> Duration {
        Duration::from_millis(self.thought_interval_ms)
    }

    pub fn thought_error_backoff(&self) -> Duration {
        Duration::from_millis(self.thought_error_backoff_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Connection settings for the llama.cpp-compatible completion server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LlmConfig {
    #[validate(url)]
    pub server_url: String,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1))]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            auth_token: None,
            temperature: 0.7,
            max_tokens: 160,
        }
    }
}

/// How diagnostics are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" | "bunyan" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Everything the engine needs, grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    #[validate(nested)]
    pub flow: FlowConfig,
    #[validate(nested)]
    pub orchestrator: OrchestratorConfig,
    #[validate(nested)]
    pub llm: LlmConfig,
    pub log_format: LogFormat,
    /// Characters requested when the cast is generated.
    #[validate(range(min = 1, max = 8))]
    pub character_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flow: FlowConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            llm: LlmConfig::default(),
            log_format: LogFormat::default(),
            character_count: 3,
        }
    }
}

impl EngineConfig {
    /// Builds the configuration from defaults overridden by environment variables.
    ///
    /// Recognised variables: `ENSEMBLE_IDLE_SECS`, `ENSEMBLE_INITIATION_CHANCE`,
    /// `ENSEMBLE_USER_RESPONSE_CHANCE`, `ENSEMBLE_DIRECT_RESPONSE_CHANCE`,
    /// `ENSEMBLE_MAX_HISTORY`, `ENSEMBLE_THOUGHT_MULTIPLIER`,
    /// `ENSEMBLE_GENERATION_TIMEOUT_SECS`, `ENSEMBLE_LLM_URL`,
    /// `ENSEMBLE_TEMPERATURE`, `ENSEMBLE_LOG_FORMAT`, `ENSEMBLE_CHARACTER_COUNT`
    /// and `LLAMA_AUTH_TOKEN`.
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = EngineConfig::default();

        override_from_env("ENSEMBLE_IDLE_SECS", &mut config.flow.idle_time_threshold_secs)?;
        override_from_env("ENSEMBLE_INITIATION_CHANCE", &mut config.flow.initiation_chance)?;
        override_from_env(
            "ENSEMBLE_USER_RESPONSE_CHANCE",
            &mut config.flow.user_response_chance,
        )?;
        override_from_env(
            "ENSEMBLE_DIRECT_RESPONSE_CHANCE",
            &mut config.flow.direct_response_chance,
        )?;
        override_from_env("ENSEMBLE_MAX_HISTORY", &mut config.orchestrator.max_history_length)?;
        override_from_env(
            "ENSEMBLE_THOUGHT_MULTIPLIER",
            &mut config.orchestrator.thought_queue_multiplier,
        )?;
        override_from_env(
            "ENSEMBLE_GENERATION_TIMEOUT_SECS",
            &mut config.orchestrator.generation_timeout_secs,
        )?;
        override_from_env("ENSEMBLE_LLM_URL", &mut config.llm.server_url)?;
        override_from_env("ENSEMBLE_TEMPERATURE", &mut config.llm.temperature)?;
        override_from_env("ENSEMBLE_LOG_FORMAT", &mut config.log_format)?;
        override_from_env("ENSEMBLE_CHARACTER_COUNT", &mut config.character_count)?;
        config.llm.auth_token = env::var("LLAMA_AUTH_TOKEN").ok().filter(|t| !t.is_empty());

        config
            .validate()
            .map_err(|e| AppError::Config(format!("Invalid configuration: {}", e)))?;
        Ok(config)
    }
}

fn override_from_env<T>(key: &str, slot: &mut T) -> Result<(), AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = env::var(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} has invalid value '{}': {}", key, raw, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flow.idle_time_threshold(), Duration::from_secs(45));
        assert_eq!(config.orchestrator.max_history_length, 10);
        assert_eq!(config.orchestrator.thought_queue_multiplier, 2);
    }

    #[test]
    fn test_probability_out_of_range_is_rejected() {
        let flow = FlowConfig {
            initiation_chance: 1.5,
            ..FlowConfig::default()
        };
        assert!(flow.validate().is_err());
    }

    #[test]
    fn test_non_finite_idle_threshold_is_rejected() {
        for value in [f64::INFINITY, f64::NAN] {
            let flow = FlowConfig {
                idle_time_threshold_secs: value,
                ..FlowConfig::default()
            };
            assert!(flow.validate().is_err(), "{} accepted", value);
        }
    }

    #[test]
    fn test_from_env_rejects_non_finite_idle_threshold() {
        for raw in ["inf", "NaN"] {
            temp_env::with_var("ENSEMBLE_IDLE_SECS", Some(raw), || {
                assert!(matches!(EngineConfig::from_env(), Err(AppError::Config(_))));
            });
        }
    }

    #[test]
    fn test_unvalidated_infinite_threshold_saturates() {
        let flow = FlowConfig {
            idle_time_threshold_secs: f64::INFINITY,
            ..FlowConfig::default()
        };
        assert_eq!(flow.idle_time_threshold(), Duration::MAX);
    }

    #[test]
    fn test_zero_history_is_rejected() {
        let config = OrchestratorConfig {
            max_history_length: 0,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("ENSEMBLE_MAX_HISTORY", Some("4")),
                ("ENSEMBLE_INITIATION_CHANCE", Some("0.5")),
                ("ENSEMBLE_LOG_FORMAT", Some("json")),
                ("LLAMA_AUTH_TOKEN", Some("secret")),
                ("ENSEMBLE_CHARACTER_COUNT", Some("4")),
            ],
            || {
                let config = EngineConfig::from_env().unwrap();
                assert_eq!(config.orchestrator.max_history_length, 4);
                assert_eq!(config.flow.initiation_chance, 0.5);
                assert_eq!(config.log_format, LogFormat::Json);
                assert_eq!(config.llm.auth_token.as_deref(), Some("secret"));
                assert_eq!(config.character_count, 4);
            },
        );
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        temp_env::with_var("ENSEMBLE_MAX_HISTORY", Some("many"), || {
            assert!(matches!(EngineConfig::from_env(), Err(AppError::Config(_))));
        });
        temp_env::with_var("ENSEMBLE_USER_RESPONSE_CHANCE", Some("3.0"), || {
            assert!(matches!(EngineConfig::from_env(), Err(AppError::Config(_))));
        });
        temp_env::with_var("ENSEMBLE_CHARACTER_COUNT", Some("0"), || {
            assert!(matches!(EngineConfig::from_env(), Err(AppError::Config(_))));
        });
    }
}
