//! Replace the server's state.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use state_client::{CurrentState, MockTransport, StateClient, Transport, WebSocketTransport};

use super::connect;
use crate::config::{ClientFileConfig, StateCache};

/// Parse state content given on the command line or read from a file.
pub fn parse_content(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("State content must be valid JSON")
}

/// Run the set command.
pub async fn run(data_dir: &Path, content: &Value, use_mock: bool) -> Result<CurrentState> {
    let config = ClientFileConfig::load(data_dir).await?;
    let cached = StateCache::load_state(data_dir).await?;

    let state = if use_mock {
        let client = connect(
            &config,
            MockTransport::with_server(CurrentState::default()),
            cached,
        )
        .await?;
        do_set(client, data_dir, content).await?
    } else {
        let client = connect(&config, WebSocketTransport::new(), cached).await?;
        do_set(client, data_dir, content).await?
    };

    println!("State set!");
    println!();
    println!("  ID: {}", state.id);
    Ok(state)
}

/// Common set logic for any transport.
async fn do_set<T: Transport + 'static>(
    client: StateClient<T>,
    data_dir: &Path,
    content: &Value,
) -> Result<CurrentState> {
    let result = client.set_state(content).await;
    client.stop().await?;

    let state = result.context("Server did not accept the state")?;
    StateCache::remember(data_dir, &state).await?;
    Ok(state)
}
