use std::sync::{Arc, RwLock};

/// Shared current scene text. The narrator writes it; prompts read it.
#[derive(Debug, Clone, Default)]
pub struct SceneHandle {
    text: Arc<RwLock<String>>,
}

impl SceneHandle {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Arc::new(RwLock::new(text.into())),
        }
    }

    /// The current scene, or an empty string if the lock was poisoned.
    pub fn current(&self) -> String {
        self.text.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set(&self, text: impl Into<String>) {
        match self.text.write() {
            Ok(mut guard) => *guard = text.into(),
            Err(poisoned) => *poisoned.into_inner() = text.into(),
        }
    }
}
