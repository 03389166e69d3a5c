//! Pending request table for statesync.
//!
//! Tracks requests that were sent but not yet answered. Inbound frames are
//! matched against the table in two ways:
//! - **Exact**: the frame echoes a `rid` that is in the table
//! - **By shape**: the frame has no `rid`, and every pending entry whose
//!   [`Expectation`] accepts it is resolved
//!
//! Once a tagged reply has been seen, the table switches to strict mode and
//! untagged frames stop resolving requests. Strict mode lasts until
//! [`PendingRequests::drain`] is called at the end of the connection.
//!
//! The table is generic over the waiter `W` so the client can store a
//! completion channel while tests store plain markers.

use serde_json::Value;
use state_types::{RequestId, ServerMessage};
use std::collections::BTreeMap;

/// What a pending request is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Any frame carrying a `state`.
    State,
    /// A `pong` whose value equals the probe value exactly.
    Pong(Value),
}

impl Expectation {
    /// Whether `message` satisfies this expectation.
    pub fn matches(&self, message: &ServerMessage) -> bool {
        match self {
            Expectation::State => message.state.is_some(),
            Expectation::Pong(value) => message.pong.as_ref() == Some(value),
        }
    }
}

/// Outstanding requests keyed by request id.
#[derive(Debug)]
pub struct PendingRequests<W> {
    /// Next request id to hand out; never reused within a client.
    next_id: u64,
    /// Entries in registration order.
    entries: BTreeMap<RequestId, (Expectation, W)>,
    /// Set once a reply echoed a request id.
    strict: bool,
}

impl<W> PendingRequests<W> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
            strict: false,
        }
    }

    /// Register a request and return the id to put on the wire.
    pub fn register(&mut self, expectation: Expectation, waiter: W) -> RequestId {
        let rid = RequestId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(rid, (expectation, waiter));
        rid
    }

    /// Remove a request without resolving it (e.g. its send failed).
    pub fn cancel(&mut self, rid: RequestId) -> Option<W> {
        self.entries.remove(&rid).map(|(_, waiter)| waiter)
    }

    /// Resolve every request satisfied by `message`.
    ///
    /// Only frames carrying `state` or `pong` can be replies; anything else
    /// (a server ping) resolves nothing, whatever its `rid`.
    pub fn settle(&mut self, message: &ServerMessage) -> Vec<W> {
        if message.state.is_none() && message.pong.is_none() {
            return Vec::new();
        }

        if let Some(rid) = message.rid {
            self.strict = true;
            let matched = self
                .entries
                .get(&rid)
                .is_some_and(|(expectation, _)| expectation.matches(message));
            return if matched {
                self.cancel(rid).into_iter().collect()
            } else {
                Vec::new()
            };
        }

        if self.strict {
            return Vec::new();
        }

        let matched: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|(_, (expectation, _))| expectation.matches(message))
            .map(|(rid, _)| *rid)
            .collect();
        matched
            .into_iter()
            .filter_map(|rid| self.cancel(rid))
            .collect()
    }

    /// Remove every request (connection ended) and leave strict mode.
    pub fn drain(&mut self) -> Vec<W> {
        self.strict = false;
        std::mem::take(&mut self.entries)
            .into_values()
            .map(|(_, waiter)| waiter)
            .collect()
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the server has been seen echoing request ids.
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

impl<W> Default for PendingRequests<W> {
    fn default() -> Self {
        Self::new()
    }
}
