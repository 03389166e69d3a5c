//! Mock transport for testing.
//!
//! Captures sent frames, lets tests queue inbound frames, and can play a
//! minimal state server so the client can be driven end to end without a
//! network.

use super::{Transport, TransportError};
use async_trait::async_trait;
use state_types::{ClientMessage, CurrentState, ServerMessage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    readable: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    connect_attempts: u32,
    sent_messages: Vec<String>,
    receive_queue: VecDeque<String>,
    fail_connects: u32,
    connect_delay: Duration,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
    peer_closed: bool,
    server: Option<MockStateServer>,
}

/// In-process stand-in for the state server.
#[derive(Debug)]
struct MockStateServer {
    state: CurrentState,
    echo_request_ids: bool,
    answer_pings: bool,
    auto_reply: bool,
}

impl MockStateServer {
    fn new(state: CurrentState) -> Self {
        Self {
            state,
            echo_request_ids: true,
            answer_pings: true,
            auto_reply: true,
        }
    }

    /// Reply the real server would send for `message`, if any.
    fn respond(&mut self, message: ClientMessage) -> Option<ServerMessage> {
        if !self.auto_reply {
            if let ClientMessage::Set { state, .. } = message {
                self.state = state;
            }
            return None;
        }
        let rid = message.rid().filter(|_| self.echo_request_ids);
        let reply = match message {
            ClientMessage::Get { .. } => ServerMessage::state(self.state.clone()),
            ClientMessage::Set { state, .. } => {
                self.state = state;
                ServerMessage::state(self.state.clone())
            }
            ClientMessage::Ping { ping, .. } if self.answer_pings => ServerMessage::pong(ping),
            ClientMessage::Ping { .. } | ClientMessage::Pong { .. } => return None,
        };
        Some(reply.with_rid(rid))
    }
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport backed by an in-process state server.
    ///
    /// The server answers Get, Set and Ping like the real one, echoing
    /// request ids.
    pub fn with_server(state: CurrentState) -> Self {
        let transport = Self::new();
        transport.lock().server = Some(MockStateServer::new(state));
        transport
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap()
    }

    /// Queue a frame to be returned by `recv()`.
    pub fn queue_response(&self, frame: impl Into<String>) {
        self.lock().receive_queue.push_back(frame.into());
        self.readable.notify_one();
    }

    /// Queue a server message to be returned by `recv()`.
    pub fn push_server_message(&self, message: &ServerMessage) {
        let frame = serde_json::to_string(message).unwrap();
        self.queue_response(frame);
    }

    /// Get all frames that were sent.
    pub fn sent_messages(&self) -> Vec<String> {
        self.lock().sent_messages.clone()
    }

    /// Get all sent frames that parse as client messages.
    pub fn sent_client_messages(&self) -> Vec<ClientMessage> {
        self.lock()
            .sent_messages
            .iter()
            .filter_map(|frame| ClientMessage::from_json(frame).ok())
            .collect()
    }

    /// Get the last frame that was sent.
    pub fn last_sent(&self) -> Option<String> {
        self.lock().sent_messages.last().cloned()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.lock().connected_address.clone()
    }

    /// Number of `connect()` calls so far, failed ones included.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Cause the next `count` connect() calls to fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().fail_connects = count;
    }

    /// Make each connect() take `delay` before it resolves.
    ///
    /// The delay is read when the call starts.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = delay;
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.lock().fail_next_recv = Some(error.to_string());
        self.readable.notify_one();
    }

    /// Drop the connection from the server side.
    ///
    /// The pending (or next) `recv()` reports the connection closed.
    pub fn disconnect_peer(&self) {
        self.lock().peer_closed = true;
        self.readable.notify_one();
    }

    /// Current state held by the mock server.
    pub fn server_state(&self) -> Option<CurrentState> {
        self.lock().server.as_ref().map(|server| server.state.clone())
    }

    /// Replace the mock server's state without telling the client.
    pub fn set_server_state(&self, state: CurrentState) {
        if let Some(server) = self.lock().server.as_mut() {
            server.state = state;
        }
    }

    /// Simulate a server restart: state is forgotten and the connection drops.
    pub fn restart_server(&self) {
        self.set_server_state(CurrentState::default());
        self.disconnect_peer();
    }

    /// Whether the mock server echoes `rid` on replies.
    pub fn set_echo_request_ids(&self, echo: bool) {
        if let Some(server) = self.lock().server.as_mut() {
            server.echo_request_ids = echo;
        }
    }

    /// Whether the mock server answers client pings.
    pub fn set_answer_pings(&self, answer: bool) {
        if let Some(server) = self.lock().server.as_mut() {
            server.answer_pings = answer;
        }
    }

    /// Whether the mock server replies on its own; when off, tests queue
    /// replies themselves.
    pub fn set_auto_reply(&self, auto_reply: bool) {
        if let Some(server) = self.lock().server.as_mut() {
            server.auto_reply = auto_reply;
        }
    }

    /// Clear all state (messages, queue, connection, server).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            readable: Arc::clone(&self.readable),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let delay = {
            let mut inner = self.lock();
            inner.connect_attempts += 1;
            inner.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();

        // Check for forced failure
        if inner.fail_connects > 0 {
            inner.fail_connects -= 1;
            return Err(TransportError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }

        inner.connected = true;
        inner.peer_closed = false;
        inner.receive_queue.clear();
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let reply = {
            let mut inner = self.lock();

            if !inner.connected || inner.peer_closed {
                return Err(TransportError::NotConnected);
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(TransportError::SendFailed(error));
            }

            inner.sent_messages.push(frame.to_string());

            let message = ClientMessage::from_json(frame).ok();
            match (inner.server.as_mut(), message) {
                (Some(server), Some(message)) => server.respond(message),
                _ => None,
            }
        };

        if let Some(reply) = reply {
            self.push_server_message(&reply);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        loop {
            {
                let mut inner = self.lock();

                if !inner.connected {
                    return Err(TransportError::NotConnected);
                }

                // Check for forced failure
                if let Some(error) = inner.fail_next_recv.take() {
                    return Err(TransportError::ReceiveFailed(error));
                }

                if let Some(frame) = inner.receive_queue.pop_front() {
                    return Ok(frame);
                }

                if inner.peer_closed {
                    inner.connected = false;
                    return Err(TransportError::ConnectionClosed);
                }
            }
            self.readable.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        let inner = self.lock();
        inner.connected && !inner.peer_closed
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.lock().connected = false;
        self.readable.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use state_types::RequestId;
    use std::time::Duration;

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_connects() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect("ws://test/api/state").await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(transport.connect_attempts(), 1);
        assert_eq!(
            transport.connected_address(),
            Some("ws://test/api/state".to_string())
        );
    }

    #[tokio::test]
    async fn mock_transport_sends_messages() {
        let transport = MockTransport::new();
        transport.connect("ws://test").await.unwrap();

        transport.send(r#"{"get":true}"#).await.unwrap();
        transport.send(r#"{"ping":"a"}"#).await.unwrap();

        let sent = transport.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], r#"{"get":true}"#);
        assert_eq!(transport.last_sent().as_deref(), Some(r#"{"ping":"a"}"#));
    }

    #[tokio::test]
    async fn mock_transport_receives_queued_messages() {
        let transport = MockTransport::new();
        transport.connect("ws://test").await.unwrap();

        transport.queue_response("one");
        transport.queue_response("two");

        assert_eq!(transport.recv().await.unwrap(), "one");
        assert_eq!(transport.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn recv_waits_for_data() {
        let transport = MockTransport::new();
        transport.connect("ws://test").await.unwrap();

        let reader = transport.clone();
        let handle = tokio::spawn(async move { reader.recv().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        transport.queue_response("late");
        assert_eq!(handle.await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn disconnect_peer_closes_recv() {
        let transport = MockTransport::new();
        transport.connect("ws://test").await.unwrap();

        let reader = transport.clone();
        let handle = tokio::spawn(async move { reader.recv().await });

        transport.disconnect_peer();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn mock_transport_closes() {
        let transport = MockTransport::new();
        transport.connect("ws://test").await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn send_without_connect_fails() {
        let transport = MockTransport::new();
        let result = transport.send("{}").await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn recv_without_connect_fails() {
        let transport = MockTransport::new();
        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn forced_connect_failures() {
        let transport = MockTransport::new();
        transport.fail_next_connects(2);

        assert!(matches!(
            transport.connect("ws://test").await,
            Err(TransportError::ConnectionFailed(_))
        ));
        assert!(transport.connect("ws://test").await.is_err());
        assert!(!transport.is_connected());

        transport.connect("ws://test").await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn forced_send_failure() {
        let transport = MockTransport::new();
        transport.connect("ws://test").await.unwrap();
        transport.fail_next_send("buffer full");

        let result = transport.send("{}").await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        // Next send should work
        transport.send("{}").await.unwrap();
    }

    #[tokio::test]
    async fn forced_recv_failure() {
        let transport = MockTransport::new();
        transport.connect("ws://test").await.unwrap();
        transport.queue_response("data");
        transport.fail_next_recv("reset");

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ReceiveFailed(_))));

        assert_eq!(transport.recv().await.unwrap(), "data");
    }

    // ===========================================
    // Mock Server Tests
    // ===========================================

    #[tokio::test]
    async fn server_answers_get_with_rid() {
        let state = CurrentState::new("s1".into(), json!({"background": true}));
        let transport = MockTransport::with_server(state.clone());
        transport.connect("ws://test").await.unwrap();

        let get = ClientMessage::get().with_rid(Some(RequestId::new(5)));
        transport.send(&get.to_json().unwrap()).await.unwrap();

        let reply = ServerMessage::from_json(&transport.recv().await.unwrap()).unwrap();
        assert_eq!(reply.state, Some(state));
        assert_eq!(reply.rid, Some(RequestId::new(5)));
    }

    #[tokio::test]
    async fn server_stores_set_and_answers_ping() {
        let transport = MockTransport::with_server(CurrentState::default());
        transport.set_echo_request_ids(false);
        transport.connect("ws://test").await.unwrap();

        let state = CurrentState::new("abc".into(), json!(1));
        let set = ClientMessage::set(state.clone()).with_rid(Some(RequestId::new(1)));
        transport.send(&set.to_json().unwrap()).await.unwrap();
        transport
            .send(&ClientMessage::ping(json!("p")).to_json().unwrap())
            .await
            .unwrap();

        let ack = ServerMessage::from_json(&transport.recv().await.unwrap()).unwrap();
        assert_eq!(ack.state, Some(state.clone()));
        assert_eq!(ack.rid, None);

        let pong = ServerMessage::from_json(&transport.recv().await.unwrap()).unwrap();
        assert_eq!(pong.pong, Some(json!("p")));
        assert_eq!(transport.server_state(), Some(state));
    }

    #[tokio::test]
    async fn restart_server_forgets_state() {
        let transport =
            MockTransport::with_server(CurrentState::new("abc".into(), json!(1)));
        transport.connect("ws://test").await.unwrap();

        transport.restart_server();

        assert_eq!(transport.server_state(), Some(CurrentState::default()));
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.connect("ws://test").await.unwrap();
        assert!(transport2.is_connected());

        transport1.send("a").await.unwrap();
        transport2.send("b").await.unwrap();
        assert_eq!(transport1.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn mock_transport_reset_clears_all() {
        let transport = MockTransport::with_server(CurrentState::default());
        transport.connect("ws://test").await.unwrap();
        transport.send("{}").await.unwrap();

        transport.reset();

        assert!(!transport.is_connected());
        assert!(transport.sent_messages().is_empty());
        assert!(transport.server_state().is_none());
    }
}
