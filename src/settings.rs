use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::UserScores;

/// On-device state: the student's scores and preferred state codes. Loaded
/// when a command starts, written back on every change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub scores: UserScores,
    #[serde(default)]
    pub preferred_states: Vec<String>,
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Platform config location, e.g. `~/.config/sisu-medicina/settings.json`.
    pub fn default_location() -> anyhow::Result<Self> {
        let base = dirs::config_dir().context("could not determine the user config directory")?;
        Ok(Self::new(base.join("sisu-medicina").join("settings.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable settings fall back to defaults; a corrupt file
    /// must not lock the user out of the tool.
    pub fn load(&self) -> Settings {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                tracing::warn!(path = %self.path.display(), error = %err, "settings file is corrupt, using defaults");
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Clamp a subject score to the valid ENEM range and round to one decimal.
pub fn normalize_score(value: f64) -> f64 {
    let clamped = value.clamp(0.0, 1000.0);
    (clamped * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_clamped_and_rounded() {
        assert_eq!(normalize_score(1200.0), 1000.0);
        assert_eq!(normalize_score(-5.0), 0.0);
        assert_eq!(normalize_score(712.46), 712.5);
        assert_eq!(normalize_score(712.44), 712.4);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = store.load();
        assert!(!settings.scores.is_complete());
        assert!(settings.preferred_states.is_empty());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));

        let mut settings = Settings::default();
        settings.scores.linguagens = Some(701.5);
        settings.scores.redacao = Some(880.0);
        settings.preferred_states = vec!["MG".to_string(), "SP".to_string()];
        store.save(&settings).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.scores.linguagens, Some(701.5));
        assert_eq!(loaded.scores.redacao, Some(880.0));
        assert_eq!(loaded.preferred_states, vec!["MG", "SP"]);
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::new(path);
        let settings = store.load();
        assert_eq!(settings.scores, UserScores::default());
    }
}
