//! Pod Healer CLI
//!
//! Triggers collection and detection passes on a running healer and
//! shows the resulting remediation actions.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{detection, status};

/// Pod Healer CLI
#[derive(Parser)]
#[command(name = "healctl")]
#[command(author, version, about = "CLI for the Pod Healer remediation service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via HEALER_API_URL env var)
    #[arg(long, env = "HEALER_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the threshold pass and restart breaching pods
    Detect,

    /// Run the predictive pass over recent history
    Predict,

    /// Pull current metrics from Prometheus into the store
    Collect,

    /// Show service health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Detect => detection::detect(&client, cli.format).await?,
        Commands::Predict => detection::predict(&client, cli.format).await?,
        Commands::Collect => detection::collect(&client, cli.format).await?,
        Commands::Health => status::health(&client, cli.format).await?,
    }

    Ok(())
}
