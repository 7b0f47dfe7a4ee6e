//! `ssalmuk config` — Configuration and stored settings.

use ssalmuk_config::AppConfig;

use super::{CliResult, load_config, open_settings};

pub fn show() -> CliResult {
    let mut shown = load_config()?;
    let settings = open_settings()?;

    shown.api_key = shown.api_key.as_ref().map(|_| "***".to_string());
    let toml_str = toml::to_string_pretty(&shown)?;

    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{toml_str}");
    println!("# {}", settings.path().display());
    println!(
        "stored api key:   {}",
        if settings.api_key().is_empty() { "(none)" } else { "***" }
    );
    let workspace = settings.workspace_root();
    println!(
        "stored workspace: {}",
        if workspace.is_empty() { "(none)" } else { workspace.as_str() }
    );
    Ok(())
}

pub fn set_key(key: &str) -> CliResult {
    let mut settings = open_settings()?;
    let stored = settings.set_api_key(key)?;
    if stored.is_empty() {
        println!("API key cleared.");
    } else {
        println!("API key saved to {}", settings.path().display());
    }
    Ok(())
}

pub fn set_workspace(path: &str) -> CliResult {
    let mut settings = open_settings()?;
    let trimmed = path.trim();
    let root = if trimmed.is_empty() {
        String::new()
    } else {
        std::path::absolute(trimmed)?.to_string_lossy().into_owned()
    };

    let stored = settings.set_workspace_root(&root)?;
    if stored.is_empty() {
        println!("Workspace cleared.");
    } else {
        println!("Workspace set to {stored}");
    }
    Ok(())
}
