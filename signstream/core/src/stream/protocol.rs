//! Stream Wire Protocol
//!
//! JSON text frames exchanged over a stream connection. Every message carries
//! a `type` discriminator.
//!
//! ```text
//! server -> client   animation_metadata  animation_frame*  animation_complete
//!                    error  ping  pong  stats
//! client -> server   ping  restart_animation  get_stats
//! ```
//!
//! Wire timestamps are Unix seconds as floats.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::package::AnimationArtifact;
use crate::render::RenderedFrame;

use super::manager::StreamStats;

/// Current time as fractional Unix seconds
#[must_use]
pub fn unix_timestamp() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let micros = Utc::now().timestamp_micros() as f64;
    micros / 1_000_000.0
}

/// Machine-readable error codes sent in `error` frames
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No cached artifact for the stream id
    AnimationNotFound,
    /// The cached frame blob could not be decoded
    DecodeError,
}

/// Body of an `error` frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable description
    pub message: String,
    /// When the error was raised
    pub timestamp: f64,
}

/// Body of an `animation_metadata` frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationMetadata {
    /// Last keyframe timestamp plus its duration
    pub total_duration: f64,
    /// Frames the animation spans at `fps`
    pub frame_count: u64,
    /// Playback rate
    pub fps: u32,
    /// Canvas size as `WIDTHxHEIGHT`
    pub resolution: String,
    /// Gloss string the animation was built from
    pub gloss_input: String,
    /// Tokens parsed from the gloss
    pub parsed_words: Vec<String>,
    /// Whether this is a degraded placeholder
    pub fallback: bool,
    /// Generation error behind a fallback artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&AnimationArtifact> for AnimationMetadata {
    fn from(artifact: &AnimationArtifact) -> Self {
        Self {
            total_duration: artifact.total_duration_seconds,
            frame_count: artifact.frame_count,
            fps: artifact.fps,
            resolution: artifact.resolution.to_string(),
            gloss_input: artifact.input_gloss.clone(),
            parsed_words: artifact.parsed_tokens.clone(),
            fallback: artifact.fallback,
            error: artifact.error.clone(),
        }
    }
}

/// Body of an `animation_complete` frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    /// Animation frames delivered in this playback
    pub frames_sent: usize,
    /// Total animation duration in seconds
    pub total_duration: f64,
}

/// Messages sent from the server to a client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once before the frames of a playback
    AnimationMetadata {
        /// Stream the playback belongs to
        stream_id: String,
        /// Sequence metadata
        data: AnimationMetadata,
        /// Send time
        timestamp: f64,
    },
    /// One rendered frame
    AnimationFrame {
        /// Stream the playback belongs to
        stream_id: String,
        /// The frame
        data: RenderedFrame,
        /// Send time
        timestamp: f64,
    },
    /// Sent after the last frame of a playback
    AnimationComplete {
        /// Stream the playback belongs to
        stream_id: String,
        /// Playback summary
        data: CompletionSummary,
        /// Send time
        timestamp: f64,
    },
    /// A recoverable failure on this stream
    Error {
        /// Stream the error belongs to
        stream_id: String,
        /// Error details
        error: ErrorBody,
    },
    /// Liveness probe
    Ping {
        /// Send time
        timestamp: f64,
    },
    /// Reply to a client `ping`
    Pong {
        /// Send time
        timestamp: f64,
    },
    /// Reply to `get_stats`
    Stats {
        /// Manager-wide statistics
        data: StreamStats,
        /// Send time
        timestamp: f64,
    },
}

impl ServerMessage {
    /// Metadata frame for an artifact
    #[must_use]
    pub fn metadata(stream_id: &str, artifact: &AnimationArtifact) -> Self {
        Self::AnimationMetadata {
            stream_id: stream_id.to_string(),
            data: AnimationMetadata::from(artifact),
            timestamp: unix_timestamp(),
        }
    }

    /// Frame message
    #[must_use]
    pub fn frame(stream_id: &str, frame: RenderedFrame) -> Self {
        Self::AnimationFrame {
            stream_id: stream_id.to_string(),
            data: frame,
            timestamp: unix_timestamp(),
        }
    }

    /// Completion message
    #[must_use]
    pub fn complete(stream_id: &str, frames_sent: usize, total_duration: f64) -> Self {
        Self::AnimationComplete {
            stream_id: stream_id.to_string(),
            data: CompletionSummary {
                frames_sent,
                total_duration,
            },
            timestamp: unix_timestamp(),
        }
    }

    /// Error message
    #[must_use]
    pub fn error(stream_id: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            stream_id: stream_id.to_string(),
            error: ErrorBody {
                code,
                message: message.into(),
                timestamp: unix_timestamp(),
            },
        }
    }

    /// Liveness probe
    #[must_use]
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: unix_timestamp(),
        }
    }

    /// Reply to a client ping
    #[must_use]
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: unix_timestamp(),
        }
    }

    /// Statistics reply
    #[must_use]
    pub fn stats(data: StreamStats) -> Self {
        Self::Stats {
            data,
            timestamp: unix_timestamp(),
        }
    }

    /// The wire `type` of this message
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AnimationMetadata { .. } => "animation_metadata",
            Self::AnimationFrame { .. } => "animation_frame",
            Self::AnimationComplete { .. } => "animation_complete",
            Self::Error { .. } => "error",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Stats { .. } => "stats",
        }
    }

    /// Serialize to a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns the JSON error if a payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages sent from a client to the server
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client liveness probe; answered with `pong`
    Ping,
    /// Replay the cached animation from the top
    RestartAnimation,
    /// Ask for manager statistics
    GetStats,
    /// Any other `type`; ignored
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a client text frame
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed input or a missing `type`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_parse() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(), ClientMessage::Ping);
        assert_eq!(
            ClientMessage::parse(r#"{"type":"restart_animation"}"#).unwrap(),
            ClientMessage::RestartAnimation
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"get_stats","extra":1}"#).unwrap(),
            ClientMessage::GetStats
        );
    }

    #[test]
    fn test_unknown_client_type_is_tolerated() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"dance"}"#).unwrap(),
            ClientMessage::Unknown
        );
    }

    #[test]
    fn test_invalid_client_json_is_error() {
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn test_error_frame_shape() {
        let msg = ServerMessage::error("s1", ErrorCode::AnimationNotFound, "Animation data not available");
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["stream_id"], "s1");
        assert_eq!(value["error"]["code"], "ANIMATION_NOT_FOUND");
        assert_eq!(value["error"]["message"], "Animation data not available");
        assert!(value["error"]["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_completion_frame_shape() {
        let msg = ServerMessage::complete("s1", 4, 2.3);
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "animation_complete");
        assert_eq!(value["data"], json!({ "frames_sent": 4, "total_duration": 2.3 }));
        assert_eq!(msg.kind(), "animation_complete");
    }

    #[test]
    fn test_ping_pong_kinds() {
        let ping = serde_json::to_value(ServerMessage::ping()).unwrap();
        let pong = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(ping["type"], "ping");
        assert_eq!(pong["type"], "pong");
        assert!(pong["timestamp"].is_f64());
    }

    #[test]
    fn test_server_messages_parse_back() {
        let msg = ServerMessage::error("s1", ErrorCode::DecodeError, "corrupt");
        let parsed: ServerMessage = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }
}
