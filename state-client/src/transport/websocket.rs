//! WebSocket transport.
//!
//! Speaks text frames over `tokio-tungstenite`. The stream is split so that a
//! reader blocked in `recv()` never holds up `send()`. A `close()` issued while
//! a `connect()` is still handshaking wins: the late stream is dropped instead
//! of replacing whatever a newer connect installed.

use super::{Transport, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Transport over a single WebSocket connection.
#[derive(Default)]
pub struct WebSocketTransport {
    writer: Mutex<Option<WsWrite>>,
    reader: Mutex<Option<WsRead>>,
    connected: AtomicBool,
    /// Bumped by every close.
    generation: AtomicU64,
}

impl WebSocketTransport {
    /// Create a transport with no open connection.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let (stream, _response) = connect_async(address)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (write, read) = stream.split();

        let mut writer = self.writer.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Dropping WebSocket to {} opened before close", address);
            return Err(TransportError::ConnectionFailed(
                "closed while connecting".to_string(),
            ));
        }
        *writer = Some(write);
        *self.reader.lock().await = Some(read);
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("WebSocket connected to {}", address);
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;

        writer
            .send(Message::text(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("WebSocket closed by peer: {:?}", frame);
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ConnectionClosed);
                }
                // Control frames are answered by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Binary(_))) => {
                    return Err(TransportError::ReceiveFailed(
                        "unexpected binary frame".to_string(),
                    ));
                }
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        let writer = self.writer.lock().await.take();
        // A reader still parked in recv() keeps its half until it sees the close
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }

        if let Some(mut writer) = writer {
            // Peer may already be gone
            if let Err(e) = writer.close().await {
                tracing::debug!("WebSocket close handshake failed: {}", e);
            }
        }
        Ok(())
    }
}
