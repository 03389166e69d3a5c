//! Relay sessions over a real socket.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use state_relay::{serve, Config, StateRelay};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running {
    addr: SocketAddr,
    relay: Arc<StateRelay>,
    stop: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<Result<(), state_relay::RelayError>>,
}

async fn start(config: Config) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let relay = Arc::new(StateRelay::new(config));
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, relay.clone(), async move {
        let _ = stopped.await;
    }));
    Running {
        addr,
        relay,
        stop,
        server,
    }
}

async fn open(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/api/state", addr)).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next JSON text frame, or None if the socket closed.
async fn next_json(socket: &mut Socket) -> Option<Value> {
    let read = async {
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for a frame")
}

#[tokio::test]
async fn get_returns_unset_state_on_fresh_relay() {
    let running = start(Config::default()).await;
    let mut socket = open(running.addr).await;

    send(&mut socket, json!({"get": true})).await;
    let reply = next_json(&mut socket).await.unwrap();

    assert_eq!(reply, json!({"state": {"id": "", "content": null}}));
}

#[tokio::test]
async fn set_is_pushed_to_every_session() {
    let running = start(Config::default()).await;
    let mut setter = open(running.addr).await;
    let mut watcher = open(running.addr).await;

    // Make sure the watcher's session is up before the set lands
    send(&mut watcher, json!({"ping": "ready"})).await;
    assert_eq!(next_json(&mut watcher).await.unwrap(), json!({"pong": "ready"}));

    let state = json!({"id": "s1", "content": {"background": true}});
    send(&mut setter, json!({ "state": state })).await;

    assert_eq!(next_json(&mut setter).await.unwrap(), json!({ "state": state }));
    assert_eq!(next_json(&mut watcher).await.unwrap(), json!({ "state": state }));
    assert_eq!(running.relay.current_state().id.as_str(), "s1");
}

#[tokio::test]
async fn replies_echo_request_id() {
    let running = start(Config::default()).await;
    let mut socket = open(running.addr).await;

    send(&mut socket, json!({"ping": "p", "rid": 9})).await;
    assert_eq!(next_json(&mut socket).await.unwrap(), json!({"pong": "p", "rid": 9}));

    send(&mut socket, json!({"get": true, "rid": 10})).await;
    let reply = next_json(&mut socket).await.unwrap();
    assert_eq!(reply["rid"], json!(10));
}

#[tokio::test]
async fn invalid_frame_closes_session() {
    let running = start(Config::default()).await;
    let mut socket = open(running.addr).await;

    socket.send(Message::text("not json")).await.unwrap();

    assert!(next_json(&mut socket).await.is_none());
}

#[tokio::test]
async fn server_pings_when_enabled() {
    let mut config = Config::default();
    config.session.ping_interval_secs = 1;
    let running = start(config).await;
    let mut socket = open(running.addr).await;

    let frame = next_json(&mut socket).await.unwrap();
    assert!(frame["ping"].is_string());
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let running = start(Config::default()).await;
    let mut socket = open(running.addr).await;

    send(&mut socket, json!({"ping": "up"})).await;
    assert!(next_json(&mut socket).await.is_some());

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();

    assert!(next_json(&mut socket).await.is_none());
}
