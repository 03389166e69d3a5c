//! Main relay server implementation.

use crate::config::Config;
use crate::error::RelayError;
use crate::http::build_router;
use state_types::CurrentState;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Relay-wide metrics (atomic counters, no lock needed).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total WebSocket sessions accepted.
    pub connections_total: AtomicU64,
    /// Total Set requests applied.
    pub sets_total: AtomicU64,
    /// Total Get requests answered.
    pub gets_total: AtomicU64,
    /// Total client pings answered.
    pub pings_total: AtomicU64,
    /// Total pongs received from clients.
    pub pongs_total: AtomicU64,
    /// Total protocol errors (invalid frames, binary frames).
    pub errors_total: AtomicU64,
}

/// Main relay server.
///
/// Holds the one authoritative [`CurrentState`]. Every session subscribes to
/// it and pushes each change to its client.
pub struct StateRelay {
    config: Config,
    state: watch::Sender<CurrentState>,
    shutdown: watch::Sender<bool>,
    metrics: RelayMetrics,
    active: AtomicUsize,
    started: Instant,
}

impl std::fmt::Debug for StateRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRelay")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("active_sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

impl StateRelay {
    /// Create a relay holding the unset state.
    pub fn new(config: Config) -> Self {
        let (state, _) = watch::channel(CurrentState::default());
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            state,
            shutdown,
            metrics: RelayMetrics::default(),
            active: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    /// Get the config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get relay metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> CurrentState {
        self.state.borrow().clone()
    }

    /// Replace the current state and notify every session.
    ///
    /// Always notifies, even when the new state equals the old one, so a
    /// setter always sees its write pushed back.
    pub fn set_state(&self, state: CurrentState) {
        tracing::debug!("State replaced by {}", state.id.as_str());
        self.state.send_replace(state);
        self.metrics.sets_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Subscribe to state changes.
    ///
    /// The returned receiver has already seen the current value, so only
    /// later changes wake it.
    pub fn subscribe_state(&self) -> watch::Receiver<CurrentState> {
        self.state.subscribe()
    }

    /// Number of sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Record a new session.
    pub(crate) fn open_session(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session ending.
    pub(crate) fn close_session(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Time since the relay was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Ask every session to close.
    pub fn shutdown(&self) {
        tracing::info!("Closing {} session(s)", self.active_sessions());
        self.shutdown.send_replace(true);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Resolve once the relay has been asked to shut down.
pub async fn wait_for_shutdown(mut signal: watch::Receiver<bool>) {
    // A closed sender means the relay is gone; treat that as shutdown too.
    let _ = signal.wait_for(|stop| *stop).await;
}

/// Serve HTTP and the state WebSocket until `signal` resolves.
///
/// Open sessions are told to close when the signal fires.
///
/// # Errors
///
/// Returns an error if the accept loop fails.
pub async fn serve<F>(
    listener: TcpListener,
    relay: Arc<StateRelay>,
    signal: F,
) -> Result<(), RelayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("state-relay listening on {}", addr);
    }

    let app = build_router(relay.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            relay.shutdown();
        })
        .await?;

    tracing::info!("state-relay stopped");
    Ok(())
}
