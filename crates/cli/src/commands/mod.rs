pub mod agent;
pub mod config_cmd;
pub mod history;

use ssalmuk_config::{AppConfig, SettingsStore};
use ssalmuk_memory::FileHistory;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn load_config() -> CliResult<AppConfig> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub fn open_settings() -> CliResult<SettingsStore> {
    Ok(SettingsStore::open(SettingsStore::default_path())
        .map_err(|e| format!("Failed to load settings: {e}"))?)
}

/// `-w` flag, else the stored workspace, else blank.
pub fn resolve_workspace(flag: Option<String>, settings: &SettingsStore) -> String {
    flag.map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| settings.workspace_root())
}

pub async fn open_history(config: &AppConfig) -> CliResult<FileHistory> {
    let store = FileHistory::open(config.history_path())
        .await
        .map_err(|e| format!("Failed to open history: {e}"))?;
    Ok(store.with_limit(config.history.max_turns))
}
