//! # state-relay
//!
//! Authoritative state server for statesync.
//!
//! This crate implements the server side of the state stream:
//! - Holds the single current state in memory (no history, no persistence)
//! - Answers Get, Set and Ping on `GET /api/state` (WebSocket)
//! - Pushes every state change to every connected client
//! - Reports liveness on `GET /health`
//!
//! ## Architecture
//!
//! ```text
//! Client A ──┐                     ┌── Client B
//!            │   WebSocket (JSON)  │
//!            ├────────────────────►│
//!        ┌───┴─────────────────────┴───┐
//!        │        state-relay          │
//!        │  ┌───────────────────────┐  │
//!        │  │ watch<CurrentState>   │  │
//!        │  └───────────────────────┘  │
//!        └─────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! - `{"get":true}` → `{"state":{...}}`
//! - `{"state":{...}}` → stored, pushed to every session
//! - `{"ping":v}` → `{"pong":v}`
//! - Replies echo the request's `"rid"` when it has one

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError};
pub use error::{ProtocolError, RelayError};
pub use server::{serve, RelayMetrics, StateRelay};
