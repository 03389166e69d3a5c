//! Measure round trips to the server.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use state_client::{CurrentState, MockTransport, StateClient, Transport, WebSocketTransport};

use super::connect;
use crate::config::{ClientFileConfig, StateCache};

/// Pause between probes.
const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Run the ping command. Returns the measured latencies.
pub async fn run(data_dir: &Path, count: u32, use_mock: bool) -> Result<Vec<Duration>> {
    let mut config = ClientFileConfig::load(data_dir).await?;
    let cached = StateCache::load_state(data_dir).await?;

    // Manual probes only; the background heartbeat would interleave
    config.heartbeat_delay_ms = None;

    if use_mock {
        let client = connect(
            &config,
            MockTransport::with_server(CurrentState::default()),
            cached,
        )
        .await?;
        do_ping(client, count).await
    } else {
        let client = connect(&config, WebSocketTransport::new(), cached).await?;
        do_ping(client, count).await
    }
}

/// Common ping logic for any transport.
async fn do_ping<T: Transport + 'static>(
    client: StateClient<T>,
    count: u32,
) -> Result<Vec<Duration>> {
    let endpoint = client.endpoint().clone();
    let mut latencies = Vec::new();

    for seq in 0..count {
        if seq > 0 {
            tokio::time::sleep(PING_INTERVAL).await;
        }
        match client.ping().await {
            Ok(latency) => {
                println!("pong from {}: seq={} time={:.2?}", endpoint, seq, latency);
                latencies.push(latency);
            }
            Err(e) => {
                println!("no pong from {}: seq={} ({})", endpoint, seq, e);
            }
        }
    }

    client.stop().await?;

    println!();
    println!("{} sent, {} received", count, latencies.len());
    if let Some(average) = average(&latencies) {
        println!("average {:.2?}", average);
    }
    Ok(latencies)
}

fn average(latencies: &[Duration]) -> Option<Duration> {
    let total: Duration = latencies.iter().sum();
    u32::try_from(latencies.len())
        .ok()
        .filter(|n| *n > 0)
        .map(|n| total / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn average_of_nothing_is_none() {
        assert_eq!(average(&[]), None);
    }

    #[test]
    fn average_divides_total() {
        let latencies = [Duration::from_millis(10), Duration::from_millis(30)];
        assert_eq!(average(&latencies), Some(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn ping_requires_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), 1, true).await.is_err());
    }

    #[tokio::test]
    async fn ping_with_mock_server() {
        let dir = tempdir().unwrap();
        ClientFileConfig::new("http://localhost:4316")
            .save(dir.path())
            .await
            .unwrap();

        let latencies = run(dir.path(), 1, true).await.unwrap();
        assert_eq!(latencies.len(), 1);
    }
}
