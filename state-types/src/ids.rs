//! Identity and correlation types for statesync.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Random bytes behind a [`StateId`] (16 base64 characters).
const STATE_ID_BYTES: usize = 12;

/// Random bytes behind a [`ProbeValue`] (8 base64 characters).
const PROBE_VALUE_BYTES: usize = 6;

/// Generate `N` random bytes, displayed as URL-safe base64.
fn random_token<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Identifier of a state value.
///
/// Generated randomly by whichever side sets the state. The empty id means
/// "never set" (a fresh server).
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    /// Create a new random StateId.
    pub fn random() -> Self {
        Self(random_token::<STATE_ID_BYTES>())
    }

    /// The empty id of a state that was never set.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Whether this is the "never set" id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({:?})", self.0)
    }
}

/// Random value carried by a liveness probe and echoed back in its pong.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbeValue(String);

impl ProbeValue {
    /// Create a new random probe value.
    pub fn random() -> Self {
        Self(random_token::<PROBE_VALUE_BYTES>())
    }

    /// Get the value as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the JSON value sent on the wire.
    pub fn into_value(self) -> Value {
        Value::String(self.0)
    }
}

impl fmt::Debug for ProbeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProbeValue({})", self.0)
    }
}

/// Per-connection request identifier.
///
/// Attached to outbound requests as `"rid"`; servers that echo it let the
/// client match replies exactly instead of by shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Create a RequestId from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
