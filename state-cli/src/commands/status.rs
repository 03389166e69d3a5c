//! Show local client status.

use anyhow::Result;
use std::path::Path;

use crate::config::{unix_now, ClientFileConfig, StateCache};

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    println!("=== statesync status ===");
    println!();

    let config = match ClientFileConfig::load(data_dir).await {
        Ok(config) => config,
        Err(_) => {
            println!("Client: NOT INITIALIZED");
            println!();
            println!("Run 'statesync init --url <url>' to initialize.");
            return Ok(());
        }
    };

    println!("Client:");
    println!("  Server:    {}", config.base_url);
    match config.client_config().state_endpoint() {
        Ok(endpoint) => println!("  Endpoint:  {}", endpoint),
        Err(e) => println!("  Endpoint:  INVALID ({})", e),
    }
    println!("  Reconnect: every {} ms", config.reconnect_delay_ms);
    match config.heartbeat_delay_ms {
        Some(delay) => println!("  Heartbeat: every {} ms", delay),
        None => println!("  Heartbeat: off"),
    }
    println!("  Timeout:   {} s", config.connect_timeout_secs);
    println!();

    match StateCache::load(data_dir).await? {
        Some(cache) => {
            println!("Cached state:");
            println!("  ID:    {}", cache.state.id);
            println!("  Saved: {}", format_timestamp(cache.saved_at));
        }
        None => println!("Cached state: NONE"),
    }

    Ok(())
}

/// Format a Unix timestamp as a human-readable string.
fn format_timestamp(ts: u64) -> String {
    let diff = unix_now().saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use state_client::{CurrentState, StateId};
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_without_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn status_with_config_and_cache() {
        let dir = tempdir().unwrap();
        ClientFileConfig::new("http://localhost:4316")
            .save(dir.path())
            .await
            .unwrap();
        StateCache::remember(dir.path(), &CurrentState::new(StateId::from("s1"), json!(1)))
            .await
            .unwrap();

        assert!(run(dir.path()).await.is_ok());
    }

    #[test]
    fn format_timestamp_works() {
        let now = unix_now();

        assert_eq!(format_timestamp(now), "just now");
        assert!(format_timestamp(now - 120).contains("minutes"));
        assert!(format_timestamp(now - 7200).contains("hours"));
        assert!(format_timestamp(now - 172800).contains("days"));
    }
}
