//! Configuration loading, validation, and management for ssalmuk.
//!
//! Loads configuration from `~/.ssalmuk/config.toml` with environment
//! variable overrides. Validates all settings at startup. User-editable
//! settings (stored credential, workspace root) live in [`SettingsStore`].

pub mod settings;

pub use settings::SettingsStore;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ssalmuk/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Process-wide default credential for the model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name passed to the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Backend base URL override (proxies, tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature; backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_model() -> String {
    "gemini-2.5-flash".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("agent", &self.agent)
            .field("context", &self.context)
            .field("tools", &self.tools)
            .field("history", &self.history)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on model-phase cycles per run
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Replaces the built-in persona instruction when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_turns() -> u32 {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            system_prompt_override: None,
        }
    }
}

/// Caps for the workspace context sent with every model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default = "default_max_chars_per_file")]
    pub max_chars_per_file: usize,

    #[serde(default = "default_max_total_chars")]
    pub max_total_chars: usize,

    #[serde(default = "default_tree_max_depth")]
    pub tree_max_depth: usize,
}

fn default_max_files() -> usize {
    40
}
fn default_max_chars_per_file() -> usize {
    8_000
}
fn default_max_total_chars() -> usize {
    120_000
}
fn default_tree_max_depth() -> usize {
    6
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_chars_per_file: default_max_chars_per_file(),
            max_total_chars: default_max_total_chars(),
            tree_max_depth: default_tree_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default `run_command` timeout when the model does not pass one
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_command_timeout_ms() -> u64 {
    60_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Entries retained per workspace
    #[serde(default = "default_history_turns")]
    pub max_turns: usize,

    /// History document location; `~/.ssalmuk/history.json` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_history_turns() -> usize {
    ssalmuk_core::history::DEFAULT_HISTORY_LIMIT
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_history_turns(),
            path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Also checks environment variables:
    /// - `SSALMUK_API_KEY`, then `GEMINI_API_KEY` (when no key is configured)
    /// - `SSALMUK_MODEL`, then `GEMINI_MODEL`
    /// - `SSALMUK_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("SSALMUK_API_KEY").or_else(|| non_empty("GEMINI_API_KEY"));
        }
        if let Some(model) = non_empty("SSALMUK_MODEL").or_else(|| non_empty("GEMINI_MODEL")) {
            self.model = model;
        }
        if let Some(base_url) = non_empty("SSALMUK_BASE_URL") {
            self.base_url = Some(base_url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ssalmuk")
    }

    /// Where conversation history is persisted.
    pub fn history_path(&self) -> PathBuf {
        self.history
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("history.json"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }

        if self.context.max_files == 0
            || self.context.max_chars_per_file == 0
            || self.context.max_total_chars == 0
        {
            return Err(ConfigError::ValidationError(
                "context caps must be greater than 0".into(),
            ));
        }

        if self.tools.command_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.history.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_turns must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if a process-wide default credential is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: None,
            temperature: None,
            agent: AgentConfig::default(),
            context: ContextConfig::default(),
            tools: ToolsConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ssalmuk_core::Error {
    fn from(err: ConfigError) -> Self {
        ssalmuk_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.agent.max_turns, 20);
        assert_eq!(config.context.max_files, 40);
        assert_eq!(config.context.max_chars_per_file, 8_000);
        assert_eq!(config.context.max_total_chars, 120_000);
        assert_eq!(config.tools.command_timeout_ms, 60_000);
        assert_eq!(config.history.max_turns, 50);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.agent.max_turns, config.agent.max_turns);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
model = "gemini-2.5-pro"

[agent]
max_turns = 5

[tools]
command_timeout_ms = 1000
"#,
        )
        .unwrap();
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.tools.command_timeout_ms, 1000);
        assert_eq!(config.context.max_files, 40);
    }

    #[test]
    fn invalid_values_rejected() {
        let zero_turns = AppConfig {
            agent: AgentConfig {
                max_turns: 0,
                system_prompt_override: None,
            },
            ..AppConfig::default()
        };
        assert!(zero_turns.validate().is_err());

        let hot = AppConfig {
            temperature: Some(5.0),
            ..AppConfig::default()
        };
        assert!(hot.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "gemini-2.5-flash");
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_follow_precedence() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("GEMINI_API_KEY", "gemini-key"),
            ("SSALMUK_API_KEY", "ssalmuk-key"),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("SSALMUK_BASE_URL", "http://localhost:9999"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("ssalmuk-key"));
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:9999"));
    }

    #[test]
    fn configured_key_beats_environment() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(env(&[("GEMINI_API_KEY", "from-env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn blank_env_values_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("GEMINI_API_KEY", "  "), ("SSALMUK_MODEL", "")]));
        assert!(!config.has_api_key());
        assert_eq!(config.model, "gemini-2.5-flash");
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = AppConfig {
            api_key: Some("super-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn history_path_defaults_under_config_dir() {
        let config = AppConfig::default();
        assert!(config.history_path().ends_with(".ssalmuk/history.json"));

        let custom = AppConfig {
            history: HistoryConfig {
                max_turns: 10,
                path: Some(PathBuf::from("/tmp/h.json")),
            },
            ..AppConfig::default()
        };
        assert_eq!(custom.history_path(), PathBuf::from("/tmp/h.json"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini-2.5-flash"));
        assert!(toml_str.contains("max_turns = 20"));
    }
}
