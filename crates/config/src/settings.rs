//! Persisted user settings: the stored credential and workspace root.
//!
//! Backed by `~/.ssalmuk/settings.toml`. Every setter writes through to
//! disk immediately.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{AppConfig, ConfigError};

#[derive(Clone, Default, Serialize, Deserialize)]
struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    workspace_root: Option<String>,
}

/// Key-value settings storage.
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .field("api_key", &crate::redact(&self.settings.api_key))
            .field("workspace_root", &self.settings.workspace_root)
            .finish()
    }
}

impl SettingsStore {
    /// Default location: `~/.ssalmuk/settings.toml`.
    pub fn default_path() -> PathBuf {
        AppConfig::config_dir().join("settings.toml")
    }

    /// Open the store, treating a missing file as empty settings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            Settings::default()
        };
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored credential, or an empty string.
    pub fn api_key(&self) -> String {
        self.settings.api_key.clone().unwrap_or_default()
    }

    /// Store a credential; an empty string clears it. Returns the stored value.
    pub fn set_api_key(&mut self, key: &str) -> Result<String, ConfigError> {
        let key = key.trim();
        self.settings.api_key = (!key.is_empty()).then(|| key.to_string());
        self.save()?;
        Ok(self.api_key())
    }

    /// The stored workspace root, or an empty string.
    pub fn workspace_root(&self) -> String {
        self.settings.workspace_root.clone().unwrap_or_default()
    }

    /// Store a workspace root; an empty string clears it. Returns the stored value.
    pub fn set_workspace_root(&mut self, root: &str) -> Result<String, ConfigError> {
        let root = root.trim();
        self.settings.workspace_root = (!root.is_empty()).then(|| root.to_string());
        self.save()?;
        Ok(self.workspace_root())
    }

    fn save(&self) -> Result<(), ConfigError> {
        let write_err = |reason: String| ConfigError::WriteError {
            path: self.path.clone(),
            reason,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(&self.settings).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| write_err(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), "Saved settings");
        Ok(())
    }
}
