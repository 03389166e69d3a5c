//! Post-connect reconciliation rule.
//!
//! After every successful connect the client fetches the server's state and
//! compares it with what it knew before connecting. The server wins, except
//! when it has clearly lost its state (restart) while the client still has
//! one: then the client pushes its copy back.

use state_types::CurrentState;

/// Outcome of comparing the pre-connect snapshot with the fetched state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Adopt the server's state as is.
    KeepServer,
    /// Server has never been set; push the snapshot content back.
    RestoreClient,
}

/// Decide who wins after a reconnect.
pub fn reconcile(snapshot: &CurrentState, fetched: &CurrentState) -> Reconciliation {
    if fetched.id.is_empty() && !snapshot.id.is_empty() {
        Reconciliation::RestoreClient
    } else {
        Reconciliation::KeepServer
    }
}
