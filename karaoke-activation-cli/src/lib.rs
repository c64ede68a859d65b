//! Argument parsing and command dispatch for the `karaoke-activation` binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use karaoke_activation::{ActivationConfig, ActivationEngine, ActivationStatus, MachineFingerprint};
use std::path::PathBuf;
use tracing::{debug, Level};

#[derive(Parser, Debug)]
#[command(name = "karaoke-activation")]
#[command(about = "Inspect and manage the activation of this karaoke installation")]
pub struct Args {
    /// Path to the activation database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Base URL of the activation server
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Override the machine id keys are bound to
    #[arg(long, global = true)]
    pub machine_id: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the activation status from the local record only
    Status,
    /// Check the key with the activation server and show the status
    Verify,
    /// Activate this machine with a key
    Redeem {
        /// Activation key, XXXX-XXXX-XXXX-XXXX
        key: String,
    },
    /// Remove the local activation
    Deactivate,
    /// Print the machine id used for key binding
    MachineId,
}

impl Args {
    /// Log level selected by `--verbose`.
    #[must_use]
    pub fn log_level(&self) -> Level {
        if self.verbose { Level::DEBUG } else { Level::INFO }
    }

    /// Environment configuration with command-line overrides on top.
    pub fn config(&self) -> Result<ActivationConfig> {
        let mut config = ActivationConfig::from_env().context("Failed to read configuration")?;
        if let Some(db) = &self.db {
            config.database_path = db.clone();
        }
        if let Some(url) = &self.url {
            config.authority.base_url = url.trim_end_matches('/').to_string();
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// The explicit machine id, or this machine's fingerprint.
    #[must_use]
    pub fn machine_id(&self) -> String {
        self.machine_id
            .clone()
            .unwrap_or_else(|| MachineFingerprint::generate().id().to_string())
    }
}

/// Runs the selected command and returns what should be printed.
pub async fn run(args: &Args) -> Result<String> {
    let machine_id = args.machine_id();
    if matches!(args.command, Command::MachineId) {
        return Ok(machine_id);
    }

    let config = args.config()?;
    debug!("Using activation database at {:?}", config.database_path);
    let engine = ActivationEngine::open(&config, machine_id)
        .context("Failed to open activation engine")?;

    let status = match &args.command {
        Command::Status => engine.status().await?,
        Command::Verify => engine.verify().await?,
        Command::Redeem { key } => engine.redeem(key).await.context("Activation failed")?,
        Command::Deactivate => engine.deactivate().await?,
        Command::MachineId => return Ok(engine.machine_id().to_string()),
    };
    render(&status)
}

/// Pretty JSON in the shape the desktop UI consumes.
pub fn render(status: &ActivationStatus) -> Result<String> {
    serde_json::to_string_pretty(status).context("Failed to encode status")
}
