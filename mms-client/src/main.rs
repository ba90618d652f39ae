//! MMS command line entry point.

use clap::Parser;
use mms_client::cli::{self, Cli, CliError};
use mms_client::session::Session;
use mms_client::telemetry::{init_tracing, TelemetryConfig};
use mms_core::ClientConfig;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref())?;
    init_tracing(&TelemetryConfig::default())?;

    let session = Session::connect(config)?;
    let output = cli::run(&session, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
