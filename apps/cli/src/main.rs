//! shardlift command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shardlift", version, about = "Resumable chunked uploads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file, resuming any earlier partial upload of it.
    Upload {
        /// File to upload.
        file: PathBuf,

        /// Configuration file (defaults to the per-user config).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Backend base URL, overriding the configured one.
        #[arg(long)]
        server: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Upload {
            file,
            config,
            server,
        } => {
            let mut config = config::Config::load(config.as_deref())?;
            if let Some(url) = server {
                config.server.base_url = url;
            }
            tracing::info!(server = %config.server.base_url, "configuration loaded");

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::upload(file, config))
        }
    }
}
