//! Karaoke activation command-line tool
//!
//! Usage:
//!   karaoke-activation status
//!   karaoke-activation redeem AB12-CD34-EF56-GH78
//!   karaoke-activation verify --url http://localhost:8080
//!
//! Status is printed as JSON on stdout; logs go to stderr.

use anyhow::Result;
use clap::Parser;
use karaoke_activation_cli::{run, Args};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let output = run(&args).await?;
    println!("{output}");
    Ok(())
}
