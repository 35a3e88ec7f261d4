//! CLI entry point for cardata.

pub mod auth;
pub mod stream;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CardataConfig;

/// BMW CarData CLI
#[derive(Parser, Debug)]
#[command(name = "cardata", version, about = "BMW CarData authentication and telemetry streaming")]
pub struct Cli {
    /// CarData client id (a UUID from the CarData portal)
    #[arg(long, global = true, env = "CARDATA_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Where the session is persisted
    #[arg(long, global = true, env = "CARDATA_SESSION_PATH")]
    pub session_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the device authorization flow and store the session
    Login,
    /// Show the stored session
    Status,
    /// Forget the stored session
    Logout,
    /// Print a valid access token, refreshing if needed
    Token,
    /// Print streamed vehicle messages as JSON lines until Ctrl-C
    Stream(StreamArgs),
}

/// Arguments for `cardata stream`.
#[derive(Parser, Debug)]
pub struct StreamArgs {
    /// Vehicle identification number; repeat for several vehicles
    #[arg(long = "vin")]
    pub vins: Vec<String>,

    /// Receive messages for every vehicle on the account
    #[arg(long)]
    pub all: bool,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> CardataConfig {
        let mut config = CardataConfig::from_env();
        if let Some(client_id) = &self.client_id {
            config = config.with_client_id(client_id);
        }
        if let Some(path) = &self.session_path {
            config = config.with_session_path(path);
        }
        config
    }
}
