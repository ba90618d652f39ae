//! Command line of the `mms` binary.

use crate::session::Session;
use crate::telemetry::TelemetryError;
use clap::{Parser, Subcommand};
use mms_core::{ConfigError, MmsError, RequestOptions};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mms(#[from] MmsError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Parser)]
#[command(name = "mms")]
#[command(about = "Cached access to the MMS model-management backend", long_about = None)]
pub struct Cli {
    /// Client config file. Defaults to $MMS_CLIENT_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print one element
    Get {
        id: String,

        #[arg(short, long)]
        workspace: Option<String>,

        /// Revision number or timestamp
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Print the version history of an element
    Versions {
        id: String,

        #[arg(short, long)]
        workspace: Option<String>,
    },

    /// List the sites visible to the configured user
    Sites,

    /// List every workspace
    Workspaces,

    /// Print the image link of a diagram
    Image {
        id: String,

        #[arg(short, long)]
        workspace: Option<String>,

        #[arg(short, long)]
        version: Option<String>,
    },
}

fn options(workspace: Option<String>, version: Option<String>) -> RequestOptions {
    RequestOptions {
        workspace,
        version,
        ..RequestOptions::default()
    }
}

/// Run `command` against `session`, returning the JSON to print.
pub async fn run(session: &Session, command: Command) -> Result<Value, CliError> {
    let output = match command {
        Command::Get {
            id,
            workspace,
            version,
        } => session
            .elements()
            .get_element(&id, &options(workspace, version))
            .await?
            .snapshot(),
        Command::Versions { id, workspace } => session
            .elements()
            .get_element_versions(&id, false, workspace.as_deref())
            .await?
            .snapshot(),
        Command::Sites => Value::Array(session.sites().get_sites().await?.values()),
        Command::Workspaces => Value::Array(session.workspaces().get_all().await?.values()),
        Command::Image {
            id,
            workspace,
            version,
        } => Value::String(
            session
                .images()
                .get_image_url(&id, &options(workspace, version))
                .await?,
        ),
    };
    Ok(output)
}
