//! Per-connection session handling.
//!
//! A session runs up to four tasks:
//! - the reader (this task) answering Get, Set and Ping
//! - a writer draining the outbound queue into the socket
//! - a watcher pushing every state change
//! - an optional pinger sending server pings
//!
//! When the reader stops, for any reason, the others are stopped with it.

use crate::error::{ProtocolError, ProtocolResult};
use crate::server::{wait_for_shutdown, StateRelay};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use state_types::{ClientMessage, ProbeValue, ServerMessage};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Compute the direct reply to a client message, applying any state change.
///
/// A Set with a request id gets a tagged state reply. A Set without one is
/// acknowledged by the change push every session receives.
pub fn respond(relay: &StateRelay, message: ClientMessage) -> Option<ServerMessage> {
    let metrics = relay.metrics();
    match message {
        ClientMessage::Get { rid, .. } => {
            metrics.gets_total.fetch_add(1, Ordering::Relaxed);
            Some(ServerMessage::state(relay.current_state()).with_rid(rid))
        }
        ClientMessage::Set { state, rid } => {
            relay.set_state(state.clone());
            rid.map(|rid| ServerMessage::state(state).with_rid(Some(rid)))
        }
        ClientMessage::Ping { ping, rid } => {
            metrics.pings_total.fetch_add(1, Ordering::Relaxed);
            Some(ServerMessage::pong(ping).with_rid(rid))
        }
        ClientMessage::Pong { .. } => {
            metrics.pongs_total.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

/// Decode one inbound frame and compute its reply.
fn handle_frame(relay: &StateRelay, message: Message) -> ProtocolResult<Option<ServerMessage>> {
    match message {
        Message::Text(text) => {
            let request = ClientMessage::from_json(&text)?;
            Ok(respond(relay, request))
        }
        Message::Binary(data) => Err(ProtocolError::UnexpectedBinary { len: data.len() }),
        // Control frames are handled by axum
        _ => Ok(None),
    }
}

/// Queue a message for the writer.
async fn enqueue(queue: &mpsc::Sender<String>, message: &ServerMessage) -> ProtocolResult<()> {
    let frame = message.to_json()?;
    queue
        .send(frame)
        .await
        .map_err(|_| ProtocolError::SessionClosed)
}

/// Run a session until the client leaves, sends garbage, or the relay shuts down.
pub async fn run(socket: WebSocket, relay: Arc<StateRelay>) {
    relay.open_session();
    tracing::debug!("Session opened ({} active)", relay.active_sessions());

    let (mut sink, mut stream) = socket.split();
    let (queue, mut outbound) =
        mpsc::channel::<String>(relay.config().session.outbound_queue.max(1));

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                tracing::debug!("Session write failed: {}", e);
                return;
            }
        }
        let _ = sink.close().await;
    });

    let watcher = spawn_watcher(&relay, queue.clone());
    let pinger = relay
        .config()
        .session
        .ping_interval()
        .map(|interval| spawn_pinger(interval, queue.clone()));

    let shutdown = relay.shutdown_signal();
    let closing = wait_for_shutdown(shutdown);
    tokio::pin!(closing);

    loop {
        let frame = tokio::select! {
            _ = &mut closing => {
                tracing::debug!("Session closing for shutdown");
                break;
            }
            frame = stream.next() => frame,
        };

        let message = match frame {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::debug!("Session read failed: {}", e);
                break;
            }
        };

        match handle_frame(&relay, message) {
            Ok(Some(reply)) => {
                if enqueue(&queue, &reply).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Closing session: {}", e);
                break;
            }
        }
    }

    watcher.abort();
    if let Some(pinger) = pinger {
        pinger.abort();
    }
    // The writer drains what is queued, then closes the socket.
    drop(queue);
    let _ = watcher.await;
    let _ = writer.await;

    relay.close_session();
    tracing::debug!("Session closed ({} active)", relay.active_sessions());
}

/// Push every state change to this session.
fn spawn_watcher(relay: &StateRelay, queue: mpsc::Sender<String>) -> JoinHandle<()> {
    let mut changes = relay.subscribe_state();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let state = changes.borrow_and_update().clone();
            if enqueue(&queue, &ServerMessage::state(state)).await.is_err() {
                return;
            }
        }
    })
}

/// Send a server ping every `interval`.
fn spawn_pinger(interval: Duration, queue: mpsc::Sender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let ping = ServerMessage::ping(ProbeValue::random().into_value());
            if enqueue(&queue, &ping).await.is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use state_types::{CurrentState, RequestId, StateId};

    fn relay() -> StateRelay {
        StateRelay::new(Config::default())
    }

    fn sample_state() -> CurrentState {
        CurrentState::new(StateId::from("s1"), json!({"background": true}))
    }

    // ===========================================
    // respond
    // ===========================================

    #[test]
    fn get_returns_current_state() {
        let relay = relay();
        relay.set_state(sample_state());

        let reply = respond(&relay, ClientMessage::get()).unwrap();
        assert_eq!(reply, ServerMessage::state(sample_state()));
    }

    #[test]
    fn get_on_fresh_relay_returns_unset_state() {
        let reply = respond(&relay(), ClientMessage::get()).unwrap();
        let state = reply.state.unwrap();
        assert!(!state.is_set());
        assert!(state.content.is_null());
    }

    #[test]
    fn get_echoes_request_id() {
        let reply = respond(&relay(), ClientMessage::get().with_rid(Some(RequestId::new(7))))
            .unwrap();
        assert_eq!(reply.rid, Some(RequestId::new(7)));
    }

    #[test]
    fn untagged_set_is_acknowledged_by_push() {
        let relay = relay();
        let reply = respond(&relay, ClientMessage::set(sample_state()));

        assert!(reply.is_none());
        assert_eq!(relay.current_state(), sample_state());
    }

    #[test]
    fn tagged_set_gets_tagged_reply() {
        let relay = relay();
        let reply = respond(
            &relay,
            ClientMessage::set(sample_state()).with_rid(Some(RequestId::new(3))),
        )
        .unwrap();

        assert_eq!(reply.state, Some(sample_state()));
        assert_eq!(reply.rid, Some(RequestId::new(3)));
    }

    #[test]
    fn ping_echoes_value() {
        let relay = relay();
        let reply = respond(&relay, ClientMessage::ping(json!("abc"))).unwrap();

        assert_eq!(reply, ServerMessage::pong(json!("abc")));
        assert_eq!(relay.metrics().pings_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn pong_is_recorded_without_reply() {
        let relay = relay();
        assert!(respond(&relay, ClientMessage::pong(json!("p1"))).is_none());
        assert_eq!(relay.metrics().pongs_total.load(Ordering::Relaxed), 1);
    }

    // ===========================================
    // handle_frame
    // ===========================================

    #[test]
    fn text_frame_is_decoded() {
        let reply = handle_frame(&relay(), Message::Text(r#"{"ping":"x"}"#.to_string())).unwrap();
        assert_eq!(reply, Some(ServerMessage::pong(json!("x"))));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let result = handle_frame(&relay(), Message::Text("not json".to_string()));
        assert!(matches!(result, Err(ProtocolError::InvalidFrame(_))));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        let result = handle_frame(&relay(), Message::Text(r#"{"hello":1}"#.to_string()));
        assert!(matches!(result, Err(ProtocolError::InvalidFrame(_))));
    }

    #[test]
    fn binary_frame_is_rejected() {
        let result = handle_frame(&relay(), Message::Binary(vec![1, 2, 3]));
        assert!(matches!(result, Err(ProtocolError::UnexpectedBinary { len: 3 })));
    }

    #[test]
    fn control_frames_are_ignored() {
        let reply = handle_frame(&relay(), Message::Ping(vec![])).unwrap();
        assert!(reply.is_none());
    }

    // ===========================================
    // Background tasks
    // ===========================================

    #[tokio::test]
    async fn watcher_pushes_changes() {
        let relay = relay();
        let (tx, mut rx) = mpsc::channel(4);
        let watcher = spawn_watcher(&relay, tx);

        relay.set_state(sample_state());

        let frame = rx.recv().await.unwrap();
        let message = ServerMessage::from_json(&frame).unwrap();
        assert_eq!(message.state, Some(sample_state()));
        assert!(message.rid.is_none());

        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn pinger_sends_pings() {
        let (tx, mut rx) = mpsc::channel(4);
        let pinger = spawn_pinger(Duration::from_secs(5), tx);

        let frame = rx.recv().await.unwrap();
        let message = ServerMessage::from_json(&frame).unwrap();
        assert!(message.ping.is_some());
        assert!(message.state.is_none());

        pinger.abort();
    }
}
