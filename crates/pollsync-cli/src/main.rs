//! Pollsync CLI
//!
//! Command-line client for a live poll: follow the tallies as they change
//! and cast a vote.

use std::fs::File;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pollsync_core::Config;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "pollsync")]
#[command(about = "Pollsync - follow a live poll and vote")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the poll live (default)
    Watch,
    /// Fetch and print the current poll once
    Show,
    /// Vote for an option in the current poll
    Vote {
        /// Option ID
        option_id: String,
    },
    /// Show client token, voted polls and endpoints
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_base_url, ws_url, reconnect_attempts, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands need neither logging nor the engine
    if let Some(Commands::Config { command }) = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => commands::watch::run(&config, &output).await,
        Commands::Show => commands::show::run(&config, &output).await,
        Commands::Vote { option_id } => commands::vote::run(&config, &option_id, &output).await,
        Commands::Status => commands::status::show(&config, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(&key, &value, output),
    }
}

/// Initialize logging
///
/// Only initializes if POLLSYNC_LOG environment variable is set.
/// Logs to config.log_file if set, stderr otherwise.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("POLLSYNC_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "pollsync_core={},pollsync_cli={}",
        log_level, log_level
    ));

    match config.log_file {
        Some(ref log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
