//! Follow the server's state as it changes.

use anyhow::Result;
use std::path::Path;
use state_client::{
    ConnectionEvent, CurrentState, MockTransport, StateClient, Transport, WebSocketTransport,
};
use tokio::sync::broadcast::error::RecvError;

use super::connect;
use crate::config::{ClientFileConfig, StateCache};

/// Run the watch command.
///
/// Prints the current state, then one line per change. Stops after `count`
/// changes, or on Ctrl+C. Reconnects on its own while watching.
pub async fn run(data_dir: &Path, count: Option<usize>, use_mock: bool) -> Result<usize> {
    let config = ClientFileConfig::load(data_dir).await?;
    let cached = StateCache::load_state(data_dir).await?;

    if use_mock {
        let client = connect(
            &config,
            MockTransport::with_server(CurrentState::default()),
            cached,
        )
        .await?;
        do_watch(client, data_dir, count).await
    } else {
        let client = connect(&config, WebSocketTransport::new(), cached).await?;
        do_watch(client, data_dir, count).await
    }
}

/// Common watch logic for any transport.
async fn do_watch<T: Transport + 'static>(
    client: StateClient<T>,
    data_dir: &Path,
    count: Option<usize>,
) -> Result<usize> {
    let mut updates = client.subscribe();
    let mut events = client.events();

    let initial = updates.borrow_and_update().clone();
    print_state(&initial)?;
    StateCache::remember(data_dir, &initial).await?;

    let mut seen = 0;
    while count.map_or(true, |limit| seen < limit) {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                print_state(&state)?;
                StateCache::remember(data_dir, &state).await?;
                seen += 1;
            }
            event = events.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Missed {} connection events", missed);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.stop().await?;
    Ok(seen)
}

fn print_state(state: &CurrentState) -> Result<()> {
    println!("{}", serde_json::to_string(state)?);
    Ok(())
}

/// Connection changes go to stderr so stdout stays one state per line.
fn report(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected => eprintln!("# connected"),
        ConnectionEvent::ConnectFailed { attempt, error } => {
            eprintln!("# connect attempt {} failed: {}", attempt, error)
        }
        ConnectionEvent::ConnectionLost { reason } => eprintln!("# connection lost: {}", reason),
        ConnectionEvent::Disconnected => eprintln!("# disconnected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use state_client::StateId;
    use tempfile::tempdir;

    #[tokio::test]
    async fn watch_requires_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), Some(0), true).await.is_err());
    }

    #[tokio::test]
    async fn watch_with_zero_count_prints_current_state() {
        let dir = tempdir().unwrap();
        ClientFileConfig::new("http://localhost:4316")
            .save(dir.path())
            .await
            .unwrap();
        let cached = CurrentState::new(StateId::from("abc"), json!({"background": true}));
        StateCache::remember(dir.path(), &cached).await.unwrap();

        let seen = run(dir.path(), Some(0), true).await.unwrap();

        assert_eq!(seen, 0);
        // The empty mock server got the cached content back
        let state = StateCache::load_state(dir.path()).await.unwrap();
        assert_eq!(state.content, json!({"background": true}));
    }

    #[tokio::test]
    async fn watch_counts_pushed_changes() {
        let dir = tempdir().unwrap();
        let transport = MockTransport::with_server(CurrentState::default());
        let config = ClientFileConfig::new("http://localhost:4316");
        let client = connect(&config, transport.clone(), CurrentState::default())
            .await
            .unwrap();

        let watching = {
            let dir = dir.path().to_path_buf();
            let client = client.clone();
            tokio::spawn(async move { do_watch(client, &dir, Some(2)).await })
        };

        // Let the watcher subscribe before pushing
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        for id in ["s1", "s2"] {
            let state = CurrentState::new(StateId::from(id), json!(id));
            transport.push_server_message(&state_types::ServerMessage::state(state));
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let seen = watching.await.unwrap().unwrap();
        assert_eq!(seen, 2);
        assert_eq!(StateCache::load_state(dir.path()).await.unwrap().id.as_str(), "s2");
    }
}
