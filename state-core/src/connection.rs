//! Connection state machine for statesync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! connection lifecycle. The state machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (opening sockets, sending frames, sleeping between attempts)
//! is performed by state-client, not by this module.

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, nothing in progress.
    #[default]
    Disconnected,
    /// Opening a transport, retrying at a fixed delay until it succeeds.
    Connecting {
        /// Failed attempts so far for this connection.
        attempt: u32,
    },
    /// Transport open and listeners attached.
    Connected,
    /// Tearing the current transport down.
    Disconnecting {
        /// Open a fresh transport once teardown completes.
        reconnect: bool,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. An empty action list means
    /// the event was a no-op in the current state.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested { .. }) => {
                (Self::Connecting { attempt: 0 }, vec![Action::OpenTransport])
            }

            // From Connecting
            (Self::Connecting { .. }, Event::TransportOpened) => (
                Self::Connected,
                vec![
                    Action::AttachListeners,
                    Action::EmitEvent(ConnectionEvent::Connected),
                    Action::Reconcile,
                    Action::StartHeartbeat,
                ],
            ),
            (Self::Connecting { attempt }, Event::TransportFailed { error }) => {
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Connecting {
                        attempt: next_attempt,
                    },
                    vec![
                        Action::EmitEvent(ConnectionEvent::ConnectFailed {
                            attempt: next_attempt,
                            error,
                        }),
                        Action::WaitRetry {
                            attempt: next_attempt,
                        },
                    ],
                )
            }
            (Self::Connecting { attempt }, Event::RetryElapsed) => {
                (Self::Connecting { attempt }, vec![Action::OpenTransport])
            }
            (Self::Connecting { .. }, Event::DisconnectRequested) => (
                Self::Disconnecting { reconnect: false },
                vec![Action::Teardown],
            ),

            // From Connected
            (Self::Connected, Event::ConnectRequested { force_reconnect }) => {
                if force_reconnect {
                    (
                        Self::Disconnecting { reconnect: true },
                        vec![Action::Teardown],
                    )
                } else {
                    (Self::Connected, vec![])
                }
            }
            (Self::Connected, Event::ConnectionLost { reason }) => (
                Self::Disconnecting { reconnect: true },
                vec![
                    Action::EmitEvent(ConnectionEvent::ConnectionLost { reason }),
                    Action::Teardown,
                ],
            ),
            (Self::Connected, Event::DisconnectRequested) => (
                Self::Disconnecting { reconnect: false },
                vec![Action::Teardown],
            ),

            // From Disconnecting
            (Self::Disconnecting { reconnect: true }, Event::DisconnectRequested) => {
                (Self::Disconnecting { reconnect: false }, vec![])
            }
            (Self::Disconnecting { reconnect: true }, Event::TeardownCompleted) => {
                (Self::Connecting { attempt: 0 }, vec![Action::OpenTransport])
            }
            (Self::Disconnecting { reconnect: false }, Event::TeardownCompleted) => (
                Self::Disconnected,
                vec![Action::EmitEvent(ConnectionEvent::Disconnected)],
            ),

            // A racing open already won; the transport handle is in use
            (Self::Connected, Event::TransportOpened) => (Self::Connected, vec![]),

            // A transport that finished opening after we stopped wanting it
            (state, Event::TransportOpened) => (state, vec![Action::CloseTransport]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    /// Check if a connect or disconnect is in progress.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Disconnecting { .. })
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to connect.
    ConnectRequested {
        /// Tear down and reopen even when already connected.
        force_reconnect: bool,
    },
    /// Transport opened successfully.
    TransportOpened,
    /// Transport failed to open.
    TransportFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The fixed retry delay has passed.
    RetryElapsed,
    /// The live transport closed or errored without being asked to.
    ConnectionLost {
        /// Reason for the loss.
        reason: String,
    },
    /// Caller asked to disconnect.
    DisconnectRequested,
    /// Heartbeat, listeners and transport have been released.
    TeardownCompleted,
}

/// Actions to be executed by the client.
///
/// These are instructions, not side effects. The client interprets these in
/// order and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a transport to the state endpoint.
    OpenTransport,
    /// Sleep the fixed reconnect delay, then report [`Event::RetryElapsed`].
    WaitRetry {
        /// Which attempt just failed.
        attempt: u32,
    },
    /// Close a transport nobody wants anymore.
    CloseTransport,
    /// Snapshot local state and start the inbound frame listener.
    AttachListeners,
    /// Run state reconciliation against the pre-connect snapshot.
    Reconcile,
    /// Start the heartbeat probe loop.
    StartHeartbeat,
    /// Stop heartbeat and listeners, fail pending requests, close transport,
    /// then report [`Event::TeardownCompleted`].
    Teardown,
    /// Emit an event to the application.
    EmitEvent(ConnectionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport open, listeners attached.
    Connected,
    /// A connect attempt failed; another follows after the retry delay.
    ConnectFailed {
        /// Which attempt failed.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// The connection dropped; a reconnect is under way.
    ConnectionLost {
        /// Reason for the loss.
        reason: String,
    },
    /// Fully disconnected on request.
    Disconnected,
}
