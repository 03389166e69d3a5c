//! The mirrored state object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StateId, WireError};

/// The single authoritative state shared between server and clients.
///
/// `content` is opaque to the protocol; applications decide its shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    /// Identifier used to detect that the state was replaced
    pub id: StateId,
    /// Application-defined contents (any JSON)
    pub content: Value,
}

impl CurrentState {
    /// Create a state from an id and raw content.
    pub fn new(id: StateId, content: Value) -> Self {
        Self { id, content }
    }

    /// Create a state with a fresh random id from any serializable content.
    pub fn from_content<C: Serialize + ?Sized>(content: &C) -> Result<Self, WireError> {
        let content = serde_json::to_value(content).map_err(WireError::Encode)?;
        Ok(Self::new(StateId::random(), content))
    }

    /// Whether this state has ever been set (non-empty id).
    pub fn is_set(&self) -> bool {
        !self.id.is_empty()
    }

    /// Deserialize the content into an application type.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T, WireError> {
        serde_json::from_value(self.content.clone()).map_err(WireError::Decode)
    }
}
