//! Infrared CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive session (default)
//! - `run`     — Serve a single request and exit
//! - `config`  — Show, locate, or validate configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "infrared",
    about = "Infrared — plan, implement and review code changes with an LLM",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.infrared/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root that file paths resolve against
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Chat,

    /// Serve one request and exit
    Run {
        /// The request to serve
        #[arg(short, long)]
        message: String,

        /// Files or folders to add to context first
        #[arg(short, long)]
        add: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Check the configuration for problems
    Validate,
    /// Print a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = commands::SessionOptions {
        config_path: cli.config,
        workspace: cli.workspace,
    };

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat::run(options).await?,
        Commands::Run { message, add } => commands::run::run(options, message, add).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&options)?,
            ConfigAction::Path => commands::config_cmd::path()?,
            ConfigAction::Validate => commands::config_cmd::validate(&options)?,
            ConfigAction::Init => commands::config_cmd::init()?,
        },
    }

    Ok(())
}
