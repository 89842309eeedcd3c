mod commands;
mod host;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Session and navigation governance engine for browser agents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a host speaking JSON lines on stdio
    Run {
        /// Config file (defaults to ~/.warden/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// State file (defaults to ~/.warden/state.json)
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// List recorded sessions, newest first
    Sessions {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print raw JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// State file (defaults to ~/.warden/state.json)
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Evaluate a candidate navigation against the stored rules
    Check {
        /// Candidate URL
        url: String,

        /// URL already visited in the session (repeatable)
        #[arg(short = 'V', long = "visited")]
        visited: Vec<String>,

        /// State file (defaults to ~/.warden/state.json)
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Stdout carries host commands in run mode; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { config, state } => {
            commands::run_cmd::run(config, state).await?;
        }
        Commands::Sessions { limit, json, state } => {
            commands::sessions_cmd::show(limit, json, state).await?;
        }
        Commands::Check {
            url,
            visited,
            state,
        } => {
            commands::check_cmd::check(&url, visited, state).await?;
        }
    }

    Ok(())
}
