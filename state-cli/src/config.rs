//! Configuration management for statesync.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use state_client::{ClientConfig, CurrentState, DEFAULT_HEARTBEAT_DELAY, DEFAULT_RECONNECT_DELAY};
use std::path::Path;
use std::time::Duration;

const CLIENT_FILE: &str = "client.json";
const STATE_FILE: &str = "state.json";

/// Default bound on connection setup for one-shot commands.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Client configuration stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFileConfig {
    /// Server base URL (http, https, ws or wss).
    pub base_url: String,
    /// Delay between reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Delay between heartbeat probes in milliseconds. `None` disables probing.
    #[serde(default = "default_heartbeat_delay_ms")]
    pub heartbeat_delay_ms: Option<u64>,
    /// Give up on one-shot commands if not connected within this many seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY.as_millis() as u64
}

fn default_heartbeat_delay_ms() -> Option<u64> {
    Some(DEFAULT_HEARTBEAT_DELAY.as_millis() as u64)
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl ClientFileConfig {
    /// Create a configuration for `base_url` with default delays.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_delay_ms: default_heartbeat_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Build the client library configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.base_url)
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .with_heartbeat_delay(self.heartbeat_delay_ms.map(Duration::from_millis))
    }

    /// Connection setup bound.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load client configuration from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CLIENT_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Not initialized. Run 'statesync init --url <url>' first.")?;
        serde_json::from_str(&contents).context("Invalid client configuration")
    }

    /// Save client configuration to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CLIENT_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save client configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if the client is configured.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join(CLIENT_FILE).exists()
    }
}

/// Last state seen from the server, kept so a fresh server can be restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCache {
    /// The cached state.
    pub state: CurrentState,
    /// When the state was cached (Unix seconds).
    pub saved_at: u64,
}

impl StateCache {
    /// Wrap a state with the current time.
    pub fn new(state: CurrentState) -> Self {
        Self {
            state,
            saved_at: unix_now(),
        }
    }

    /// Load the cache, if one was saved.
    pub async fn load(data_dir: &Path) -> Result<Option<Self>> {
        let path = data_dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Failed to read state cache")?;
        let cache = serde_json::from_str(&contents).context("Invalid state cache")?;
        Ok(Some(cache))
    }

    /// Cached state, or the unset state if nothing was cached.
    pub async fn load_state(data_dir: &Path) -> Result<CurrentState> {
        Ok(Self::load(data_dir)
            .await?
            .map(|cache| cache.state)
            .unwrap_or_default())
    }

    /// Save the cache to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(STATE_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save state cache")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Cache `state` if it was ever set.
    pub async fn remember(data_dir: &Path, state: &CurrentState) -> Result<()> {
        if state.is_set() {
            Self::new(state.clone()).save(data_dir).await?;
        }
        Ok(())
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
