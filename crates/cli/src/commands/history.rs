//! `ssalmuk history` — Inspect or clear per-workspace conversation history.

use ssalmuk_core::history::{HistoryRole, HistoryStore};
use ssalmuk_memory::history_key;

use super::{CliResult, load_config, open_history, open_settings, resolve_workspace};

pub async fn show(workspace: Option<String>) -> CliResult {
    let config = load_config()?;
    let workspace = resolve_workspace(workspace, &open_settings()?);
    let store = open_history(&config).await?;

    let turns = store.get(&workspace).await?;
    println!("History for {}", display_workspace(&workspace));
    println!("  Key:   {}", history_key(&workspace));
    println!("  File:  {}", store.path().display());
    println!("  Turns: {}", turns.len());
    println!();

    for turn in &turns {
        let label = match turn.role {
            HistoryRole::User => "you",
            HistoryRole::Assistant => "ssalmuk",
        };
        for (i, line) in turn.text.lines().enumerate() {
            if i == 0 {
                println!("  {label:>7} > {line}");
            } else {
                println!("            {line}");
            }
        }
    }
    Ok(())
}

pub async fn clear(workspace: Option<String>) -> CliResult {
    let config = load_config()?;
    let workspace = resolve_workspace(workspace, &open_settings()?);
    let store = open_history(&config).await?;

    store.clear(&workspace).await?;
    println!("Cleared history for {}", display_workspace(&workspace));
    Ok(())
}

fn display_workspace(workspace: &str) -> &str {
    if workspace.trim().is_empty() {
        "(no workspace)"
    } else {
        workspace
    }
}
