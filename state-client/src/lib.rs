//! # state-client
//!
//! Client library for the statesync protocol.
//!
//! Keeps a single server-authoritative state object mirrored locally over one
//! long-lived WebSocket connection.
//!
//! ## Features
//!
//! - **Automatic reconnection**: fixed-delay retries, forced reconnect on
//!   connection loss or protocol corruption
//! - **Reconciliation**: after every connect the server's state is fetched;
//!   a server that lost its state gets the client's copy back
//! - **Heartbeat**: periodic liveness probes, runtime-adjustable or paused
//! - **Request correlation**: replies matched by echoed request id, or by
//!   shape for servers that don't echo
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Pure State Machine**: Uses state-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use state_client::{ClientConfig, StateClient, WebSocketTransport};
//!
//! let client = StateClient::new(ClientConfig::default(), WebSocketTransport::new())?;
//! client.start().await?;
//!
//! let mut updates = client.subscribe();
//! while updates.changed().await.is_ok() {
//!     println!("{:?}", updates.borrow().content);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod correlator;
pub mod heartbeat;
pub mod transport;

pub use client::{ClientError, StateClient};
pub use config::{
    ClientConfig, DEFAULT_HEARTBEAT_DELAY, DEFAULT_RECONNECT_DELAY, DEFAULT_STATE_PATH,
};
pub use correlator::Correlator;
pub use heartbeat::Heartbeat;
pub use state_core::{ConnectionEvent, ConnectionState};
pub use state_types::{CurrentState, StateId};
pub use transport::{MockTransport, Transport, TransportError, WebSocketTransport};
