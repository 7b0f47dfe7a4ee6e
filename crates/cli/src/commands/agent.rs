//! `ssalmuk agent` — Interactive or single-message chat mode.

use std::sync::Arc;

use ssalmuk_agent::{AgentRunner, RunRequest};
use ssalmuk_config::AppConfig;
use ssalmuk_core::event::{AgentEvent, EventBus};
use ssalmuk_core::history::HistoryStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::{CliResult, load_config, open_history, open_settings, resolve_workspace};

pub struct AgentArgs {
    pub message: Option<String>,
    pub workspace: Option<String>,
    pub api_key: Option<String>,
    pub no_history: bool,
}

/// One workspace, one credential, optionally one history store.
struct Session {
    runner: AgentRunner,
    history: Option<Box<dyn HistoryStore>>,
    workspace: String,
    api_key: Option<String>,
}

impl Session {
    async fn ask(&self, message: &str) -> ssalmuk_core::Result<String> {
        let prior = match &self.history {
            Some(store) => store.get(&self.workspace).await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not load history, continuing without it");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let request = RunRequest {
            workspace_root: self.workspace.clone(),
            user_message: message.to_string(),
            api_key: self.api_key.clone(),
            history: prior,
        };
        let outcome = self.runner.run(request).await?;
        debug!(turns = outcome.turns, "Run complete");

        if let Some(store) = &self.history
            && let Err(e) = store.append(&self.workspace, message, &outcome.text).await
        {
            warn!(error = %e, "Could not save history");
        }
        Ok(outcome.text)
    }
}

pub async fn run(args: AgentArgs) -> CliResult {
    let config = load_config()?;
    let settings = open_settings()?;
    let workspace = resolve_workspace(args.workspace, &settings);
    let api_key = args
        .api_key
        .or_else(|| Some(settings.api_key()))
        .filter(|k| !k.trim().is_empty());

    let event_bus = Arc::new(EventBus::default());
    let runner = AgentRunner::from_config(&config, event_bus.clone());

    // Check for an API key early — give a clear error
    if runner.resolve_api_key(api_key.as_deref()).is_err() {
        print_key_help();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let history: Option<Box<dyn HistoryStore>> = if args.no_history {
        None
    } else {
        Some(Box::new(open_history(&config).await?))
    };

    let printer = spawn_event_printer(event_bus.subscribe());
    let session = Session {
        runner,
        history,
        workspace,
        api_key,
    };

    let result = match args.message {
        Some(message) => match session.ask(&message).await {
            Ok(text) => {
                println!("{text}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        None => interactive(&session, &config).await,
    };

    printer.abort();
    result
}

async fn interactive(session: &Session, config: &AppConfig) -> CliResult {
    let workspace = if session.workspace.trim().is_empty() {
        "(not set, tools disabled)"
    } else {
        session.workspace.as_str()
    };

    println!();
    println!("  ssalmuk — interactive mode");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Workspace: {workspace}");
    println!("  Tools:     read_file, write_file, run_command");
    println!(
        "  History:   {}",
        if session.history.is_some() { "on" } else { "off" }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        match session.ask(message).await {
            Ok(text) => {
                println!();
                for line in text.lines() {
                    println!("  ssalmuk > {line}");
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    Ok(())
}

/// Tool notifications go to stderr; phase transitions only to the debug log.
fn spawn_event_printer(
    mut rx: broadcast::Receiver<Arc<AgentEvent>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = format_event(&event) {
                        eprintln!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn format_event(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::ToolInvoked {
            name, arguments, ..
        } => Some(format!("[tool] {name} {arguments}")),
        AgentEvent::PhaseEntered { phase, .. } => {
            debug!(%phase, "Phase entered");
            None
        }
        AgentEvent::PhaseExited { phase, .. } => {
            debug!(%phase, "Phase exited");
            None
        }
    }
}

fn print_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Store one with:");
    eprintln!("    ssalmuk config set-key <key>");
    eprintln!();
    eprintln!("  Or set one of these environment variables:");
    eprintln!("    SSALMUK_API_KEY");
    eprintln!("    GEMINI_API_KEY");
    eprintln!();
    eprintln!("  Or pass --api-key for a single run.");
    eprintln!();
}
