//! # tws-cli
//!
//! Command-line interface for the TWS topology goal engine.
//!
//! - `tws goals list/show/validate` — inspect the goal table
//! - `tws decisions` — show how rules-engine decisions map to goals
//! - `tws simulate <scenario.toml>` — replay a scenario against simulated procedures

mod commands;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tws_goal::config::DEFAULT_CONFIG_PATH;
use tws_goal::TopologyConfig;

/// TWS topology CLI — inspect goals and replay topology scenarios.
#[derive(Parser)]
#[command(name = "tws", version, about)]
struct Cli {
    /// Topology config file (defaults to .tws/topology.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the goal table.
    Goals {
        #[command(subcommand)]
        command: commands::goals::GoalsCommands,
    },
    /// List rules-engine decisions and the goal each one requests.
    Decisions,
    /// Replay a scenario file against simulated procedures.
    Simulate {
        /// Scenario file (TOML).
        path: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't mix with reports on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tws_goal=info".parse()?)
                .add_directive("tws_procedure=info".parse()?)
                .add_directive("tws=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => TopologyConfig::load(path)?,
        None => TopologyConfig::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };

    match &cli.command {
        Commands::Goals { command } => commands::goals::execute(command),
        Commands::Decisions => commands::decisions::execute(&config),
        Commands::Simulate { path, json } => commands::simulate::execute(path, *json, &config),
    }
}
