//! Stream Transport
//!
//! The Stream Manager talks to clients through two small traits so it does
//! not depend on any particular socket library:
//! - [`StreamSink`]: outbound text frames, shared by playback and replies
//! - [`StreamSource`]: inbound text frames, owned by the session loop
//!
//! The daemon adapts WebSockets to these traits. [`channel_pair`] provides an
//! in-process transport over tokio channels for embedding and tests.
//!
//! # Usage
//!
//! ```ignore
//! let (sink, source, mut peer) = channel_pair();
//!
//! // Hand sink/source to the session loop
//! tokio::spawn(serve_connection(manager, stream_id, Arc::new(sink), source, "local".into()));
//!
//! // Act as the client
//! peer.send(r#"{"type":"ping"}"#).await?;
//! let reply = peer.recv().await;
//! ```

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Default in-process channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur on a stream transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer went away
    ConnectionClosed,
    /// Writing a frame failed
    SendFailed(String),
    /// Reading a frame failed
    ReceiveFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::ReceiveFailed(msg) => write!(f, "Receive failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Outbound half of a client connection
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Send one text frame to the client
    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// Inbound half of a client connection
#[async_trait]
pub trait StreamSource: Send {
    /// Wait for the next text frame
    ///
    /// Returns `Ok(None)` once the client has closed the connection.
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError>;
}

// ============================================================================
// In-Process Channel Transport
// ============================================================================

/// Server-side sink backed by a tokio channel
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

/// Server-side source backed by a tokio channel
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

/// Client end of an in-process connection
///
/// Dropping `to_server` closes the connection from the client side;
/// dropping `from_server` makes every further server send fail.
#[derive(Debug)]
pub struct ChannelPeer {
    /// Frames sent to the server
    pub to_server: mpsc::Sender<String>,
    /// Frames received from the server
    pub from_server: mpsc::Receiver<String>,
}

impl ChannelPeer {
    /// Send a text frame to the server
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the server side is gone.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.to_server
            .send(text.into())
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Wait for the next frame from the server
    pub async fn recv(&mut self) -> Option<String> {
        self.from_server.recv().await
    }

    /// Take a frame if one is already queued
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_server.try_recv().ok()
    }
}

/// Create an in-process connection with the default capacity
#[must_use]
pub fn channel_pair() -> (ChannelSink, ChannelSource, ChannelPeer) {
    channel_pair_with_capacity(DEFAULT_CHANNEL_CAPACITY)
}

/// Create an in-process connection with a custom capacity
#[must_use]
pub fn channel_pair_with_capacity(capacity: usize) -> (ChannelSink, ChannelSource, ChannelPeer) {
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (in_tx, in_rx) = mpsc::channel(capacity);

    (
        ChannelSink { tx: out_tx },
        ChannelSource { rx: in_rx },
        ChannelPeer {
            to_server: in_tx,
            from_server: out_rx,
        },
    )
}

#[async_trait]
impl StreamSink for ChannelSink {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(text)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl StreamSource for ChannelSource {
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.recv().await)
    }
}
