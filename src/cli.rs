//! # Command Line Interface
//!
//! Single `agent` subcommand that launches the daemon.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AgentConfig;
use crate::observability::init_logging;
use crate::{startup, VERSION};

#[derive(Parser)]
#[command(name = "infisical-agent")]
#[command(about = "Client daemon that streamlines authentication and secret retrieval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the agent daemon
    Agent {
        /// Path to the agent config YAML file
        #[arg(long, default_value = "agent-config.yaml")]
        config: PathBuf,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging("info")?;

    match cli.command {
        Commands::Agent { config } => {
            info!(version = VERSION, "starting Infisical agent");
            let config = AgentConfig::load(&config)?;
            startup::run_agent(config).await?;
        }
    }

    Ok(())
}
