use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::actors::traits::Character;
use crate::error::AppError;
use crate::models::{is_user, CharacterProfile, EVERYONE};

/// The session's characters in a fixed order. Read-only once built.
#[derive(Clone)]
pub struct Roster {
    members: Vec<Arc<dyn Character>>,
}

impl std::fmt::Debug for Roster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roster").field("names", &self.names()).finish()
    }
}

impl Roster {
    /// Fails on an empty roster, a duplicate name, or a name that collides with a sentinel.
    pub fn new(members: Vec<Arc<dyn Character>>) -> Result<Self, AppError> {
        if members.is_empty() {
            return Err(AppError::Config("Roster needs at least one character".to_string()));
        }
        let mut seen = HashSet::new();
        for member in &members {
            let name = member.name();
            if is_user(name) || name == EVERYONE {
                return Err(AppError::Config(format!(
                    "'{}' is reserved and cannot name a character",
                    name
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(AppError::Config(format!("Duplicate character name: {}", name)));
            }
        }
        Ok(Self { members })
    }

    pub fn names(&self) -> Vec<String> {
        self.members.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Character>> {
        self.members.iter().find(|c| c.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|c| c.name() == name)
    }

    /// First character in roster order; the roster is never empty.
    pub fn first_name(&self) -> String {
        self.members[0].name().to_string()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Character>> {
        self.members.iter()
    }

    pub fn profiles(&self) -> Vec<CharacterProfile> {
        self.members.iter().map(|c| c.profile().clone()).collect()
    }

    /// One "Name - trait: 0.8, other: 0.3" line per character.
    pub fn describe(&self) -> String {
        self.members
            .iter()
            .map(|c| format!("{} - {}", c.name(), c.profile().trait_summary()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A known character, the user sentinel (any case) or "ALL".
    pub fn is_participant(&self, name: &str) -> bool {
        self.contains(name) || is_user(name) || name == EVERYONE
    }
}

/// Reads a JSON array of character profiles and validates each one.
pub fn load_profiles(path: &Path) -> Result<Vec<CharacterProfile>, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Cannot read roster {}: {}", path.display(), e)))?;
    let profiles: Vec<CharacterProfile> = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("Invalid roster {}: {}", path.display(), e)))?;
    for profile in &profiles {
        profile.check()?;
    }
    Ok(profiles)
}

/// Built-in cast used when character generation fails.
pub fn default_profiles() -> Vec<CharacterProfile> {
    vec![
        CharacterProfile::new("Elena")
            .with_trait("curious", 0.9)
            .with_trait("secretive", 0.6)
            .with_background("A young archivist who found a journal covered in strange symbols.")
            .with_motive("Find the hidden chamber before anyone else does."),
        CharacterProfile::new("Marcus")
            .with_trait("skeptical", 0.8)
            .with_trait("protective", 0.7)
            .with_background("The keeper of the old manor, loyal to a family long gone.")
            .with_motive("Keep the passage sealed, whatever it takes."),
    ]
}
