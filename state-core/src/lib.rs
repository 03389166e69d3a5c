//! # state-core
//!
//! Pure logic for statesync (no I/O, instant tests).
//!
//! This crate holds the decisions the client makes, without any network
//! access, so they can be tested synchronously.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`ConnectionState::on_event`] turns lifecycle events into a new state plus
//!   a list of [`Action`]s for the client to perform
//! - [`PendingRequests`] matches inbound frames to outstanding requests
//! - [`reconcile`] decides who wins after a reconnect
//!
//! The actual I/O is performed by `state-client`, which interprets the
//! actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod pending;
pub mod reconcile;

pub use connection::{Action, ConnectionEvent, ConnectionState, Event};
pub use pending::{Expectation, PendingRequests};
pub use reconcile::{reconcile, Reconciliation};
