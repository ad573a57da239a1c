//! Avatar Streaming
//!
//! Everything between a cached [`AnimationArtifact`](crate::AnimationArtifact)
//! and a connected client:
//!
//! - `manager`: connection registry, artifact cache, paced playback, expiry
//! - `protocol`: JSON wire messages
//! - `session`: per-connection loop with keepalive and guaranteed cleanup
//! - `transport`: sink/source traits plus an in-process channel transport

pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;

pub use manager::{
    ConnectionHandle, ConnectionState, ConnectionSummary, PlaybackOutcome, StreamConfig,
    StreamManager, StreamStats,
};
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use session::{handle_client_message, serve_connection, SessionEnd};
pub use transport::{
    channel_pair, channel_pair_with_capacity, ChannelPeer, ChannelSink, ChannelSource,
    StreamSink, StreamSource, TransportError,
};
