//! StateClient - the main interface for statesync.
//!
//! This module provides [`StateClient`], which keeps a local mirror of the
//! server's single authoritative state over one long-lived connection.
//!
//! # Architecture
//!
//! StateClient uses a pure state machine (from state-core) for the connection
//! lifecycle and interprets the actions it returns to perform the actual I/O
//! via the Transport trait.
//!
//! ```text
//! Application → StateClient → Transport → Network
//!                   ↓
//!              state-core (pure state machine, pending table, reconcile)
//! ```
//!
//! Background work per connection: one reader task dispatching inbound frames
//! and one heartbeat task. A lost connection is handed to a freshly spawned
//! driver task, never handled inline in the reader.
//!
//! # Example
//!
//! ```ignore
//! use state_client::{ClientConfig, StateClient, WebSocketTransport};
//!
//! let config = ClientConfig::new("http://127.0.0.1:4316/");
//! let client = StateClient::new(config, WebSocketTransport::new())?;
//!
//! client.start().await?;
//! let state = client.set_state(&serde_json::json!({"background": true})).await?;
//! client.stop().await?;
//! ```

use futures_util::future::BoxFuture;
use serde::Serialize;
use state_core::{
    reconcile, Action, ConnectionEvent, ConnectionState, Event, Expectation, Reconciliation,
};
use state_types::{ClientMessage, CurrentState, ProbeValue, ServerMessage, StateId, WireError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::heartbeat::Heartbeat;
use crate::transport::{Transport, TransportError};

/// Capacity of the connection event channel.
const EVENT_CAPACITY: usize = 64;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame encoding or decoding error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Not connected to the server.
    #[error("not connected")]
    NotConnected,

    /// Connection closed before the reply arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// Base URL or state path does not form a valid endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// The state mirroring client.
///
/// Cheap to clone; clones share one connection. Nothing connects until
/// [`start`](Self::start) is called, and [`stop`](Self::stop) must be called
/// to release the background tasks.
pub struct StateClient<T: Transport + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport + 'static> Clone for StateClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T: Transport + 'static> {
    config: ClientConfig,
    endpoint: Url,
    transport: T,
    phase: watch::Sender<ConnectionState>,
    state: watch::Sender<CurrentState>,
    events: broadcast::Sender<ConnectionEvent>,
    correlator: Correlator,
    heartbeat: Heartbeat,
    reader: Mutex<Option<JoinHandle<()>>>,
    snapshot: Mutex<CurrentState>,
    /// Bumped on every teardown; an open that started earlier is stale.
    generation: AtomicU64,
}

impl<T: Transport + 'static> StateClient<T> {
    /// Create a new client. Does not connect.
    pub fn new(config: ClientConfig, transport: T) -> Result<Self, ClientError> {
        let endpoint = config.state_endpoint()?;
        let heartbeat = Heartbeat::new(config.heartbeat_delay);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                transport,
                phase: watch::channel(ConnectionState::new()).0,
                state: watch::channel(CurrentState::default()).0,
                events,
                correlator: Correlator::new(),
                heartbeat,
                reader: Mutex::new(None),
                snapshot: Mutex::new(CurrentState::default()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Seed the local state (e.g. from a cache) before the first connect.
    ///
    /// If the server turns out to have no state, this is what gets restored.
    pub fn with_cached_state(self, state: CurrentState) -> Self {
        self.inner.state.send_replace(state);
        self
    }

    /// Connect, reconcile and start the heartbeat.
    pub async fn start(&self) -> Result<(), ClientError> {
        self.connect(false).await
    }

    /// Disconnect and release background tasks.
    pub async fn stop(&self) -> Result<(), ClientError> {
        self.disconnect().await
    }

    /// Connect to the state endpoint.
    ///
    /// Returns once connected and reconciled, retrying failed attempts at the
    /// fixed reconnect delay. Returns immediately if a connect or disconnect
    /// is already in progress, or if connected and `force_reconnect` is false.
    /// A connect aborted by [`disconnect`](Self::disconnect) returns `Ok(())`.
    pub async fn connect(&self, force_reconnect: bool) -> Result<(), ClientError> {
        let actions = self
            .inner
            .apply(Event::ConnectRequested { force_reconnect });
        if actions.is_empty() {
            tracing::debug!("Connect ignored in phase {:?}", self.connection_phase());
            return Ok(());
        }
        Arc::clone(&self.inner).drive(actions).await
    }

    /// Stop the heartbeat, detach listeners and close the transport.
    ///
    /// Idempotent. Pending requests fail with [`ClientError::ConnectionClosed`].
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let actions = self.inner.apply(Event::DisconnectRequested);
        Arc::clone(&self.inner).drive(actions).await?;

        // Another task may own the teardown
        let mut phase = self.inner.phase.subscribe();
        let _ = phase
            .wait_for(|phase| !matches!(phase, ConnectionState::Disconnecting { .. }))
            .await;
        Ok(())
    }

    /// Fetch the server's state and adopt it.
    pub async fn refresh(&self) -> Result<CurrentState, ClientError> {
        self.inner.refresh().await
    }

    /// Set new content with a fresh state id, and adopt the acknowledged state.
    pub async fn set_state<C: Serialize + ?Sized>(
        &self,
        content: &C,
    ) -> Result<CurrentState, ClientError> {
        let state = CurrentState::from_content(content)?;
        self.inner.push(state).await
    }

    /// One liveness round trip. Returns the measured latency.
    pub async fn ping(&self) -> Result<Duration, ClientError> {
        self.inner.probe().await
    }

    /// Last known state.
    pub fn current_state(&self) -> CurrentState {
        self.inner.state.borrow().clone()
    }

    /// Watch the local state; updates on every server push or exchange.
    pub fn subscribe(&self) -> watch::Receiver<CurrentState> {
        self.inner.state.subscribe()
    }

    /// Watch the connection lifecycle.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.phase.subscribe()
    }

    /// Current connection phase.
    pub fn connection_phase(&self) -> ConnectionState {
        self.inner.phase.borrow().clone()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.inner.phase.borrow().is_connected()
    }

    /// Subscribe to connection events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Change the heartbeat delay at runtime. `None` pauses probing.
    pub fn set_heartbeat_delay(&self, delay: Option<Duration>) {
        self.inner.heartbeat.set_delay(delay);
    }

    /// WebSocket URL this client connects to.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl<T: Transport + 'static> Inner<T> {
    /// Run one event through the state machine atomically.
    fn apply(&self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();
        self.phase.send_if_modified(|phase| {
            let (next, out) = phase.clone().on_event(event);
            actions = out;
            let changed = next != *phase;
            *phase = next;
            changed
        });
        actions
    }

    /// Perform actions until the state machine has nothing left to do.
    fn drive(self: Arc<Self>, actions: Vec<Action>) -> BoxFuture<'static, Result<(), ClientError>> {
        Box::pin(async move {
            let mut queue: VecDeque<Action> = actions.into();
            while let Some(action) = queue.pop_front() {
                let next = match action {
                    Action::OpenTransport => {
                        tracing::debug!("Opening transport to {}", self.endpoint);
                        let generation = self.generation.load(Ordering::SeqCst);
                        let opened = self.transport.connect(self.endpoint.as_str()).await;
                        if self.generation.load(Ordering::SeqCst) != generation {
                            // A teardown ran meanwhile; leave the transport to any newer open
                            tracing::debug!("Dropping superseded connect attempt");
                            let idle = *self.phase.borrow() == ConnectionState::Disconnected;
                            if opened.is_ok() && idle {
                                if let Err(e) = self.transport.close().await {
                                    tracing::debug!("Close failed: {}", e);
                                }
                            }
                            return Ok(());
                        }
                        match opened {
                            Ok(()) => self.apply(Event::TransportOpened),
                            Err(e) => self.apply(Event::TransportFailed {
                                error: e.to_string(),
                            }),
                        }
                    }
                    Action::WaitRetry { attempt } => {
                        let mut phase = self.phase.subscribe();
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                            _ = async { let _ = phase.wait_for(|p| !p.is_connecting()).await; } => {
                                tracing::debug!("Retry {} abandoned", attempt);
                            }
                        }
                        self.apply(Event::RetryElapsed)
                    }
                    Action::CloseTransport => {
                        tracing::debug!("Closing unwanted transport");
                        if let Err(e) = self.transport.close().await {
                            tracing::debug!("Close failed: {}", e);
                        }
                        Vec::new()
                    }
                    Action::AttachListeners => {
                        let snapshot = self.state.borrow().clone();
                        *lock(&self.snapshot) = snapshot;
                        self.spawn_reader();
                        Vec::new()
                    }
                    Action::Reconcile => {
                        let snapshot = lock(&self.snapshot).clone();
                        match self.reconcile(snapshot).await {
                            Ok(()) => Vec::new(),
                            // Teardown already rejected it and owns the reconnect
                            Err(ClientError::ConnectionClosed) => {
                                tracing::debug!("Reconciliation interrupted by teardown");
                                queue.clear();
                                Vec::new()
                            }
                            Err(e) => {
                                tracing::warn!("Reconciliation failed: {}", e);
                                queue.clear();
                                self.apply(Event::ConnectionLost {
                                    reason: format!("reconciliation failed: {e}"),
                                })
                            }
                        }
                    }
                    Action::StartHeartbeat => {
                        if self.phase.borrow().is_connected() {
                            self.start_heartbeat();
                        }
                        Vec::new()
                    }
                    Action::Teardown => {
                        self.teardown().await;
                        self.apply(Event::TeardownCompleted)
                    }
                    Action::EmitEvent(event) => {
                        self.emit(event);
                        Vec::new()
                    }
                };
                queue.extend(next);
            }
            Ok(())
        })
    }

    fn emit(&self, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Connected => {
                tracing::info!("Connected to {}", self.endpoint);
            }
            ConnectionEvent::ConnectFailed { attempt, error } => {
                tracing::warn!(
                    "Connect attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    error,
                    self.config.reconnect_delay
                );
            }
            ConnectionEvent::ConnectionLost { reason } => {
                tracing::warn!("Connection lost: {}, reconnecting", reason);
            }
            ConnectionEvent::Disconnected => {
                tracing::info!("Disconnected");
            }
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn spawn_reader(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.read_loop().await });
        if let Some(previous) = lock(&self.reader).replace(handle) {
            previous.abort();
        }
    }

    async fn read_loop(self: Arc<Self>) {
        let reason = loop {
            match self.transport.recv().await {
                Ok(frame) => match ServerMessage::from_json(&frame) {
                    Ok(message) => self.handle_message(message).await,
                    Err(e) => {
                        tracing::warn!("Malformed frame from server: {}", e);
                        break format!("malformed frame: {e}");
                    }
                },
                Err(e) => break e.to_string(),
            }
        };

        let actions = self.apply(Event::ConnectionLost { reason });
        if !actions.is_empty() {
            let inner = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = inner.drive(actions).await {
                    tracing::warn!("Reconnect failed: {}", e);
                }
            });
        }
    }

    async fn handle_message(&self, message: ServerMessage) {
        if let Some(state) = &message.state {
            self.adopt(state.clone());
        }

        if let Some(ping) = &message.ping {
            let pong = ClientMessage::pong(ping.clone()).with_rid(message.rid);
            if let Err(e) = self.send_message(&pong).await {
                tracing::debug!("Failed to answer server ping: {}", e);
            }
        }

        self.correlator.dispatch(&message);
    }

    fn adopt(&self, state: CurrentState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                tracing::debug!("State updated to {}", state.id);
                *current = state;
                true
            }
        });
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let frame = message.to_json()?;
        self.transport.send(&frame).await?;
        Ok(())
    }

    /// Send a request and wait for the frame that answers it.
    async fn request(
        &self,
        message: ClientMessage,
        expectation: Expectation,
    ) -> Result<ServerMessage, ClientError> {
        // Register before checking: a teardown after the check rejects it
        let (rid, reply) = self.correlator.register(expectation);
        if !self.phase.borrow().is_connected() {
            self.correlator.cancel(rid);
            return Err(ClientError::NotConnected);
        }

        if let Err(e) = self.send_message(&message.with_rid(Some(rid))).await {
            self.correlator.cancel(rid);
            return Err(e);
        }

        reply.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    async fn refresh(&self) -> Result<CurrentState, ClientError> {
        let reply = self
            .request(ClientMessage::get(), Expectation::State)
            .await?;
        let state = reply
            .state
            .ok_or_else(|| ClientError::Protocol("reply carries no state".into()))?;
        self.adopt(state.clone());
        Ok(state)
    }

    async fn push(&self, state: CurrentState) -> Result<CurrentState, ClientError> {
        let reply = self
            .request(ClientMessage::set(state), Expectation::State)
            .await?;
        let acked = reply
            .state
            .ok_or_else(|| ClientError::Protocol("reply carries no state".into()))?;
        self.adopt(acked.clone());
        Ok(acked)
    }

    async fn probe(&self) -> Result<Duration, ClientError> {
        let value = ProbeValue::random().into_value();
        let started = Instant::now();
        self.request(ClientMessage::ping(value.clone()), Expectation::Pong(value))
            .await?;
        Ok(started.elapsed())
    }

    async fn reconcile(&self, snapshot: CurrentState) -> Result<(), ClientError> {
        let fetched = self.refresh().await?;
        match reconcile(&snapshot, &fetched) {
            Reconciliation::KeepServer => {
                tracing::debug!("Reconciled: kept server state {}", fetched.id);
            }
            Reconciliation::RestoreClient => {
                tracing::info!(
                    "Server has no state, restoring local state {}",
                    snapshot.id
                );
                let restored = CurrentState::new(StateId::random(), snapshot.content);
                self.push(restored).await?;
            }
        }
        Ok(())
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.heartbeat.start(move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.probe().await,
                    None => Err(ClientError::ConnectionClosed),
                }
            }
        });
    }

    /// Release everything tied to the current connection.
    async fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let heartbeat = self.heartbeat.cancel();

        let reader = lock(&self.reader).take();
        if let Some(reader) = reader {
            reader.abort();
            let _ = reader.await;
        }

        // Unblocks a probe waiting on its pong before we wait for the heartbeat
        let rejected = self.correlator.reject_all();
        if rejected > 0 {
            tracing::debug!("Failed {} pending requests", rejected);
        }

        if let Some(heartbeat) = heartbeat {
            let _ = heartbeat.await;
        }

        if let Err(e) = self.transport.close().await {
            tracing::debug!("Transport close failed: {}", e);
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> std::sync::MutexGuard<'_, V> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
