//! WebSocket Transport
//!
//! Adapts an axum [`WebSocket`] to the core's [`StreamSink`] and
//! [`StreamSource`] seams so the stream session loop never sees axum types.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

use signstream_core::stream::{StreamSink, StreamSource, TransportError};

/// Outbound half of an avatar WebSocket
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

/// Inbound half of an avatar WebSocket
pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

/// Split an upgraded socket into its sink and source halves
pub fn split(socket: WebSocket) -> (WsSink, WsSource) {
    let (tx, rx) = socket.split();
    (
        WsSink {
            inner: Mutex::new(tx),
        },
        WsSource { inner: rx },
    )
}

#[async_trait]
impl StreamSink for WsSink {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut sink = self.inner.lock().await;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl StreamSource for WsSource {
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.inner.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                // Control frames are answered by axum
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }
}
