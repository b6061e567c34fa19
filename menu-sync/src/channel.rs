//! WebSocket client for the menu broadcast channel.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect detection)
//! - Outgoing queue of encoded frames, drained by a writer task
//! - Reader task decoding `menu:update` envelopes into [`ChannelEvent`]s
//!
//! Delivery is best-effort and at-most-once. Frames of other envelope types
//! and frames that fail to decode are skipped, and events are dropped while
//! the application's event queue is full or nobody is receiving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::Publisher;
use crate::config::SyncConfig;
use crate::protocol::{decode_notification, encode_notification, ChangeNotification, ProtocolError};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the channel client.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// A change made elsewhere
    Notification(ChangeNotification),
}

/// Channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid channel request: {0}")]
    InvalidRequest(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The broadcast channel client.
pub struct ChannelClient {
    url: String,

    /// Bearer credential sent with the upgrade request
    token: Option<String>,

    state: Arc<RwLock<ConnectionState>>,

    /// Producers (publishers) push encoded frames here
    outgoing_tx: mpsc::Sender<String>,

    /// Consumed by the writer task on connect
    outgoing_rx: Option<mpsc::Receiver<String>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<ChannelEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<ChannelEvent>,

    /// Frames the writer task has handed to the socket
    written: Arc<AtomicU64>,
}

impl ChannelClient {
    /// `capacity` bounds both the outgoing frame queue and the event queue.
    pub fn new(url: impl Into<String>, token: Option<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(capacity);
        Self {
            url: url.into(),
            token,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx,
            outgoing_rx: Some(outgoing_rx),
            event_rx: Some(event_rx),
            event_tx,
            written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A client for `config.ws_url`, if one is configured.
    pub fn from_config(config: &SyncConfig) -> Option<Self> {
        config
            .ws_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.token.clone(), config.broadcast_capacity))
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.take()
    }

    /// Handle for queueing encoded frames.
    pub fn outgoing(&self) -> mpsc::Sender<String> {
        self.outgoing_tx.clone()
    }

    /// A [`Publisher`] whose remote side is this channel.
    pub fn publisher(&self, capacity: usize) -> Publisher {
        Publisher::new(capacity).with_remote(self.outgoing())
    }

    /// Connect to the channel.
    ///
    /// Spawns the writer and reader tasks. A client connects once; after a
    /// disconnect a new client is needed.
    pub async fn connect(&mut self) -> Result<(), ChannelError> {
        if self.outgoing_rx.is_none() {
            return Err(ChannelError::AlreadyConnected);
        }

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::InvalidRequest(e.to_string()))?;
        if let Some(ref token) = self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ChannelError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ChannelError::Connect(e.to_string()));
            }
        };

        let Some(mut outgoing_rx) = self.outgoing_rx.take() else {
            return Err(ChannelError::AlreadyConnected);
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward queued frames to the socket
        let written = self.written.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if ws_writer.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
                written.fetch_add(1, Ordering::SeqCst);
            }
        });

        *self.state.write().await = ConnectionState::Connected;
        emit(&self.event_tx, ChannelEvent::Connected);
        log::info!("Connected to broadcast channel {}", self.url);

        // Reader task: decode incoming envelopes
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match decode_notification(text.as_str()) {
                        Ok(Some(notification)) => {
                            emit(&event_tx, ChannelEvent::Notification(notification));
                        }
                        Ok(None) => log::debug!("Ignoring non-menu frame"),
                        Err(e) => log::warn!("Skipping undecodable frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost
            writer.abort();
            *state.write().await = ConnectionState::Disconnected;
            emit(&event_tx, ChannelEvent::Disconnected);
        });

        Ok(())
    }

    /// Frames written to the socket so far.
    pub fn frames_written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames have been written, or `limit`
    /// elapses. Returns whether the count was reached.
    pub async fn wait_written(&self, count: u64, limit: Duration) -> bool {
        let reached = async {
            while self.frames_written() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(limit, reached).await.is_ok()
    }

    /// Queue one notification, waiting for queue space.
    pub async fn send(&self, notification: &ChangeNotification) -> Result<(), ChannelError> {
        let frame = encode_notification(notification)?;
        self.outgoing_tx
            .send(frame)
            .await
            .map_err(|_| ChannelError::ConnectionClosed)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Hand an event to the application without ever blocking the reader.
fn emit(event_tx: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => log::debug!("Event queue full, dropping {event:?}"),
        Err(TrySendError::Closed(_)) => {}
    }
}
