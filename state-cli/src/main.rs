//! # statesync
//!
//! CLI tool for the statesync protocol.
//!
//! ## Commands
//!
//! - `init`: Configure the server URL
//! - `get`: Print the server's state
//! - `set`: Replace the server's state
//! - `watch`: Follow state changes
//! - `ping`: Measure round trips
//! - `status`: Show local configuration and cached state
//!
//! ## Example
//!
//! ```bash
//! statesync init --url http://127.0.0.1:4316
//! statesync set '{"background": true}'
//! statesync get
//! statesync watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{get, init, ping, set, status, watch};

/// CLI tool for the statesync protocol.
#[derive(Parser, Debug)]
#[command(name = "statesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for client configuration and cached state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use an in-process mock server instead of the network (for testing/demo)
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configure the server to sync with
    Init {
        /// Server base URL (http, https, ws or wss)
        #[arg(long, short)]
        url: String,

        /// Delay between reconnect attempts, in milliseconds
        #[arg(long)]
        reconnect_delay_ms: Option<u64>,

        /// Delay between heartbeat probes, in milliseconds
        #[arg(long, conflicts_with = "no_heartbeat")]
        heartbeat_delay_ms: Option<u64>,

        /// Disable the heartbeat
        #[arg(long)]
        no_heartbeat: bool,

        /// Give up connecting after this many seconds
        #[arg(long)]
        connect_timeout_secs: Option<u64>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Print the server's state
    Get,

    /// Replace the server's state
    Set {
        /// New content as JSON (or use --file)
        content: Option<String>,

        /// File containing the new content as JSON
        #[arg(long, short, conflicts_with = "content")]
        file: Option<PathBuf>,
    },

    /// Follow state changes
    Watch {
        /// Stop after this many changes
        #[arg(long, short = 'n')]
        count: Option<usize>,
    },

    /// Measure round trips to the server
    Ping {
        /// Number of probes to send
        #[arg(long, short = 'c', default_value = "1")]
        count: u32,
    },

    /// Show local configuration and cached state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Init {
            url,
            reconnect_delay_ms,
            heartbeat_delay_ms,
            no_heartbeat,
            connect_timeout_secs,
            force,
        } => {
            let options = init::InitOptions {
                url,
                reconnect_delay_ms,
                heartbeat_delay_ms,
                no_heartbeat,
                connect_timeout_secs,
                force,
            };
            init::run(&data_dir, &options).await?;
        }
        Commands::Get => {
            get::run(&data_dir, cli.mock).await?;
        }
        Commands::Set { content, file } => {
            let raw = if let Some(content) = content {
                content
            } else if let Some(path) = file {
                tokio::fs::read_to_string(&path)
                    .await
                    .context("Failed to read file")?
            } else {
                anyhow::bail!("Must specify content or --file");
            };
            let content = set::parse_content(&raw)?;
            set::run(&data_dir, &content, cli.mock).await?;
        }
        Commands::Watch { count } => {
            watch::run(&data_dir, count, cli.mock).await?;
        }
        Commands::Ping { count } => {
            ping::run(&data_dir, count, cli.mock).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for statesync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "statesync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
