//! Fetch the server's state.

use anyhow::Result;
use std::path::Path;
use state_client::{CurrentState, MockTransport, StateClient, Transport, WebSocketTransport};

use super::connect;
use crate::config::{ClientFileConfig, StateCache};

/// Run the get command.
pub async fn run(data_dir: &Path, use_mock: bool) -> Result<CurrentState> {
    let config = ClientFileConfig::load(data_dir).await?;
    let cached = StateCache::load_state(data_dir).await?;

    let state = if use_mock {
        // A fresh mock server has no state, like a restarted server
        let client = connect(
            &config,
            MockTransport::with_server(CurrentState::default()),
            cached,
        )
        .await?;
        do_get(client, data_dir).await?
    } else {
        let client = connect(&config, WebSocketTransport::new(), cached).await?;
        do_get(client, data_dir).await?
    };

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(state)
}

/// Common get logic for any transport.
async fn do_get<T: Transport + 'static>(
    client: StateClient<T>,
    data_dir: &Path,
) -> Result<CurrentState> {
    let result = client.refresh().await;
    client.stop().await?;

    let state = result?;
    StateCache::remember(data_dir, &state).await?;
    Ok(state)
}
