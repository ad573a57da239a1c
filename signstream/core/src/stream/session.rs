//! Connection Session Loop
//!
//! Serves one client connection from connect to teardown:
//!
//! 1. Register with the [`StreamManager`] and play the cached animation
//! 2. Answer client messages (`ping`, `restart_animation`, `get_stats`)
//! 3. After `idle_timeout` of silence send a `ping`; a failed send ends the
//!    session
//!
//! Whatever ends the session (client close, transport error, failed send or
//! manager shutdown), a drop guard releases the registration.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::manager::{ConnectionHandle, PlaybackOutcome, StreamManager};
use super::protocol::{ClientMessage, ServerMessage};
use super::transport::{StreamSink, StreamSource};

const LOGGED_MESSAGE_CHARS: usize = 200;

/// Why a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection
    ClientClosed,
    /// Reading from the client failed
    ReceiveFailed,
    /// A send to the client failed
    SendFailed,
    /// The manager is shutting down
    Shutdown,
}

/// Releases the registration however the session exits
struct ReleaseGuard {
    manager: StreamManager,
    handle: ConnectionHandle,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.manager.release(&self.handle);
    }
}

/// Serve one client connection until it ends
pub async fn serve_connection<S>(
    manager: StreamManager,
    stream_id: String,
    sink: Arc<dyn StreamSink>,
    mut source: S,
    client_address: String,
) -> SessionEnd
where
    S: StreamSource,
{
    let handle = manager.connect(&stream_id, sink, client_address);
    let guard = ReleaseGuard {
        manager: manager.clone(),
        handle,
    };

    let mut shutdown = manager.shutdown_signal();
    if *shutdown.borrow_and_update() {
        return SessionEnd::Shutdown;
    }

    let end = tokio::select! {
        end = run_session(&manager, &guard.handle, &mut source) => end,
        _ = shutdown.changed() => SessionEnd::Shutdown,
    };

    debug!(stream_id = %stream_id, ?end, "Session ended");
    end
}

async fn run_session<S>(manager: &StreamManager, handle: &ConnectionHandle, source: &mut S) -> SessionEnd
where
    S: StreamSource,
{
    if let PlaybackOutcome::Aborted { .. } = manager.play_on(handle).await {
        return SessionEnd::SendFailed;
    }

    let idle_timeout = manager.config().idle_timeout;
    loop {
        let text = match timeout(idle_timeout, source.recv_text()).await {
            Err(_) => {
                debug!(stream_id = %handle.stream_id(), "Idle timeout, sending keepalive ping");
                if !manager.send_to(handle, &ServerMessage::ping()).await {
                    return SessionEnd::SendFailed;
                }
                continue;
            }
            Ok(Ok(Some(text))) => text,
            Ok(Ok(None)) => {
                info!(stream_id = %handle.stream_id(), "Client closed avatar stream");
                return SessionEnd::ClientClosed;
            }
            Ok(Err(e)) => {
                warn!(stream_id = %handle.stream_id(), error = %e, "Avatar stream receive failed");
                return SessionEnd::ReceiveFailed;
            }
        };

        manager.touch(handle);
        if !handle_client_message(manager, handle, &text).await {
            return SessionEnd::SendFailed;
        }
    }
}

/// Act on one client text frame
///
/// Returns `false` if a reply could not be sent and the connection is gone.
pub async fn handle_client_message(manager: &StreamManager, handle: &ConnectionHandle, text: &str) -> bool {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Ping) => manager.send_to(handle, &ServerMessage::pong()).await,
        Ok(ClientMessage::RestartAnimation) => {
            info!(stream_id = %handle.stream_id(), "Restarting animation playback");
            !matches!(manager.play_on(handle).await, PlaybackOutcome::Aborted { .. })
        }
        Ok(ClientMessage::GetStats) => manager.send_to(handle, &ServerMessage::stats(manager.stats())).await,
        Ok(ClientMessage::Unknown) => {
            warn!(
                stream_id = %handle.stream_id(),
                message = %truncate(text),
                "Unknown message type from client"
            );
            true
        }
        Err(e) => {
            warn!(
                stream_id = %handle.stream_id(),
                error = %e,
                message = %truncate(text),
                "Invalid JSON received from client"
            );
            true
        }
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(LOGGED_MESSAGE_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
