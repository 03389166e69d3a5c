//! Request/reply correlation over the state stream.
//!
//! Wraps the pure [`PendingRequests`] table with completion channels so
//! callers can await the reply to a frame they sent.

use state_core::{Expectation, PendingRequests};
use state_types::{RequestId, ServerMessage};
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::client::ClientError;

type Completion = oneshot::Sender<Result<ServerMessage, ClientError>>;

/// Receiver side of a registered request.
pub type Reply = oneshot::Receiver<Result<ServerMessage, ClientError>>;

/// Pending replies for the current connection.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: Mutex<PendingRequests<Completion>>,
}

impl Correlator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request before it goes on the wire.
    ///
    /// Registering first means a reply can never arrive before its slot exists.
    pub fn register(&self, expectation: Expectation) -> (RequestId, Reply) {
        let (tx, rx) = oneshot::channel();
        let rid = self.lock().register(expectation, tx);
        (rid, rx)
    }

    /// Drop a registration whose request never made it out.
    pub fn cancel(&self, rid: RequestId) {
        self.lock().cancel(rid);
    }

    /// Resolve whatever `message` answers. Returns how many were resolved.
    pub fn dispatch(&self, message: &ServerMessage) -> usize {
        let resolved = self.lock().settle(message);
        let count = resolved.len();
        for completion in resolved {
            // Caller may have given up
            let _ = completion.send(Ok(message.clone()));
        }
        count
    }

    /// Fail every pending request: the connection is gone.
    pub fn reject_all(&self) -> usize {
        let drained = self.lock().drain();
        let count = drained.len();
        for completion in drained {
            let _ = completion.send(Err(ClientError::ConnectionClosed));
        }
        count
    }

    /// Number of requests awaiting a reply.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PendingRequests<Completion>> {
        // The table is never left half-updated, so a poisoned lock is still usable
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
