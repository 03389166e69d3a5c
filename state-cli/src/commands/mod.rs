//! CLI command implementations.

pub mod get;
pub mod init;
pub mod ping;
pub mod set;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use state_client::{CurrentState, StateClient, Transport};

use crate::config::ClientFileConfig;

/// Connect a client seeded with `cached`, bounded by the configured timeout.
///
/// The protocol retries forever; one-shot commands give up instead.
pub(crate) async fn connect<T: Transport + 'static>(
    config: &ClientFileConfig,
    transport: T,
    cached: CurrentState,
) -> Result<StateClient<T>> {
    let client = StateClient::new(config.client_config(), transport)
        .context("Invalid server URL")?
        .with_cached_state(cached);

    let mut starting = {
        let client = client.clone();
        tokio::spawn(async move { client.start().await })
    };

    match tokio::time::timeout(config.connect_timeout(), &mut starting).await {
        Ok(joined) => joined
            .context("Connect task failed")?
            .context("Failed to connect to server")?,
        Err(_) => {
            client.stop().await?;
            starting.abort();
            anyhow::bail!(
                "Could not connect to {} within {}s",
                client.endpoint(),
                config.connect_timeout_secs
            );
        }
    }

    Ok(client)
}
