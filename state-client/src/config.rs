//! Client configuration.

use std::time::Duration;
use url::Url;

use crate::client::ClientError;

/// Path of the state stream relative to the base URL.
pub const DEFAULT_STATE_PATH: &str = "api/state";

/// Fixed delay between connect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Delay between heartbeat probes.
pub const DEFAULT_HEARTBEAT_DELAY: Duration = Duration::from_millis(1000);

/// Configuration for [`StateClient`](crate::StateClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the server (`http://host:port/` or `https://...`).
    pub base_url: String,
    /// Path of the state stream, joined onto `base_url`.
    pub state_path: String,
    /// Delay between failed connect attempts.
    pub reconnect_delay: Duration,
    /// Delay between heartbeat probes; `None` pauses the probe loop.
    pub heartbeat_delay: Option<Duration>,
}

impl ClientConfig {
    /// Create a configuration with default timings for `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            state_path: DEFAULT_STATE_PATH.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_delay: Some(DEFAULT_HEARTBEAT_DELAY),
        }
    }

    /// Set the state stream path.
    pub fn with_state_path(mut self, path: &str) -> Self {
        self.state_path = path.to_string();
        self
    }

    /// Set the delay between connect attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the heartbeat delay (`None` pauses probing).
    pub fn with_heartbeat_delay(mut self, delay: Option<Duration>) -> Self {
        self.heartbeat_delay = delay;
        self
    }

    /// WebSocket URL of the state stream.
    ///
    /// `https` maps to `wss`, anything else to `ws`.
    pub fn state_endpoint(&self) -> Result<Url, ClientError> {
        let mut base = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {e}", self.base_url)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut endpoint = base
            .join(self.state_path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {e}", self.state_path)))?;

        let scheme = if endpoint.scheme() == "https" || endpoint.scheme() == "wss" {
            "wss"
        } else {
            "ws"
        };
        endpoint
            .set_scheme(scheme)
            .map_err(|()| ClientError::InvalidEndpoint(self.base_url.clone()))?;
        Ok(endpoint)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:4316/")
    }
}
