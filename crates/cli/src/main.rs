//! ssalmuk CLI — the main entry point.
//!
//! Commands:
//! - `agent`    — Single-message or interactive chat against a workspace
//! - `history`  — Show or clear the stored conversation for a workspace
//! - `config`   — Show configuration, store the API key or workspace

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ssalmuk",
    about = "ssalmuk — a coding agent confined to one workspace",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Workspace root (defaults to the stored workspace)
        #[arg(short, long)]
        workspace: Option<String>,

        /// API key for this run only
        #[arg(long)]
        api_key: Option<String>,

        /// Neither load nor save conversation history
        #[arg(long)]
        no_history: bool,
    },

    /// Manage stored conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage configuration and stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print the stored turns for a workspace
    Show {
        #[arg(short, long)]
        workspace: Option<String>,
    },

    /// Forget the stored turns for a workspace
    Clear {
        #[arg(short, long)]
        workspace: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,

    /// Store the API key; an empty value clears it
    SetKey { key: String },

    /// Store the default workspace root; an empty value clears it
    SetWorkspace { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only answers
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Agent {
            message,
            workspace,
            api_key,
            no_history,
        } => {
            commands::agent::run(commands::agent::AgentArgs {
                message,
                workspace,
                api_key,
                no_history,
            })
            .await?
        }
        Commands::History { action } => match action {
            HistoryAction::Show { workspace } => commands::history::show(workspace).await?,
            HistoryAction::Clear { workspace } => commands::history::clear(workspace).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::SetKey { key } => commands::config_cmd::set_key(&key)?,
            ConfigAction::SetWorkspace { path } => commands::config_cmd::set_workspace(&path)?,
        },
    }

    Ok(())
}
