//! Initialize client configuration.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::ClientFileConfig;

/// Options for `init`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Server base URL.
    pub url: String,
    /// Reconnect delay override, in milliseconds.
    pub reconnect_delay_ms: Option<u64>,
    /// Heartbeat delay override, in milliseconds.
    pub heartbeat_delay_ms: Option<u64>,
    /// Disable the heartbeat entirely.
    pub no_heartbeat: bool,
    /// Connect timeout override, in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Overwrite an existing configuration.
    pub force: bool,
}

#[cfg(test)]
impl InitOptions {
    /// Options with only a URL set.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            reconnect_delay_ms: None,
            heartbeat_delay_ms: None,
            no_heartbeat: false,
            connect_timeout_secs: None,
            force: false,
        }
    }
}

/// Run the init command.
pub async fn run(data_dir: &Path, options: &InitOptions) -> Result<()> {
    if ClientFileConfig::exists(data_dir).await && !options.force {
        anyhow::bail!(
            "Already initialized. Use --force or delete {} to reinitialize.",
            data_dir.join("client.json").display()
        );
    }

    let mut config = ClientFileConfig::new(&options.url);
    if let Some(delay) = options.reconnect_delay_ms {
        config.reconnect_delay_ms = delay;
    }
    if let Some(delay) = options.heartbeat_delay_ms {
        config.heartbeat_delay_ms = Some(delay);
    }
    if options.no_heartbeat {
        config.heartbeat_delay_ms = None;
    }
    if let Some(timeout) = options.connect_timeout_secs {
        config.connect_timeout_secs = timeout;
    }

    let endpoint = config
        .client_config()
        .state_endpoint()
        .context("Invalid server URL")?;
    config.save(data_dir).await?;

    println!("Client initialized successfully!");
    println!();
    println!("  Server:   {}", config.base_url);
    println!("  Endpoint: {}", endpoint);
    println!("  Data dir: {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Read the state: statesync get");
    println!("  2. Follow changes: statesync watch");

    Ok(())
}
