//! # state-types
//!
//! Wire format types for the statesync protocol.
//!
//! This crate provides the foundational types used across all statesync crates:
//! - [`CurrentState`] - The single authoritative payload mirrored to clients
//! - [`StateId`], [`ProbeValue`], [`RequestId`] - Identity and correlation types
//! - [`ClientMessage`], [`ServerMessage`] - JSON text frames on the state stream
//! - [`WireError`] - Codec errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod state;

pub use error::WireError;
pub use ids::{ProbeValue, RequestId, StateId};
pub use messages::{ClientMessage, ServerMessage};
pub use state::CurrentState;
