//! Player preferences kept between sessions.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub difficulty: DifficultyLevel,
    pub theme: String,
    pub piece_set: String,
    pub sound_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            difficulty: DifficultyLevel::Medium,
            theme: "brown".to_string(),
            piece_set: "cburnett".to_string(),
            sound_enabled: true,
        }
    }
}

pub trait PreferenceStore {
    /// Never fails: anything unreadable yields the defaults.
    fn load(&self) -> Preferences;
    fn save(&self, preferences: &Preferences) -> io::Result<()>;
}

/// Preferences as one JSON document on disk.
pub struct JsonPreferenceStore {
    path: PathBuf,
}

impl JsonPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load(&self) -> Preferences {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no preferences at {}, using defaults", self.path.display());
                return Preferences::default();
            }
            Err(e) => {
                warn!("failed to read preferences {}: {e}", self.path.display());
                return Preferences::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("ignoring corrupt preferences {}: {e}", self.path.display());
            Preferences::default()
        })
    }

    fn save(&self, preferences: &Preferences) -> io::Result<()> {
        let text = serde_json::to_string_pretty(preferences)?;
        fs::write(&self.path, text)?;
        debug!("saved preferences to {}", self.path.display());
        Ok(())
    }
}
