//! Signstream Core - Text to Indian Sign Language Avatar Animation
//!
//! This crate turns text into gloss, gloss into a timed pose animation, and
//! streams that animation frame by frame to connected avatar clients. It is
//! independent of any HTTP framework; the daemon crate wires it to a web
//! server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     TranslationService                           │
//! │   text ─> transcribe ─> text_to_gloss ─> AnimationEngine         │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ AnimationArtifact
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                        AnimationEngine                           │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌───────────────────┐    │
//! │  │ PoseLibrary │─>│ TimelineBuilder  │─>│ FrameRenderer     │    │
//! │  │ Transitions │  │ (keyframe merge) │  │ (SVG per frame)   │    │
//! │  └─────────────┘  └──────────────────┘  └─────────┬─────────┘    │
//! │                                                   │ FrameBundle  │
//! └───────────────────────────────────────────────────┼──────────────┘
//!                                                     │
//! ┌───────────────────────────────────────────────────┼──────────────┐
//! │                        StreamManager                             │
//! │   artifact cache ── paced playback ── connection registry        │
//! │                           │                                      │
//! │                 StreamSink / StreamSource                        │
//! └───────────────────────────┼──────────────────────────────────────┘
//!                             │ JSON messages
//!                        avatar client
//! ```
//!
//! # Key Types
//!
//! - [`TranslationService`]: request entry point, owns the engine and cache
//! - [`AnimationEngine`]: gloss to [`AnimationArtifact`] plus [`StreamId`]
//! - [`StreamManager`]: artifact cache, connections and frame pacing
//! - [`ServiceConfig`]: layered configuration (defaults, TOML, environment)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use signstream_core::{StreamManager, ServiceConfig, TranslationService};
//! use signstream_core::stream::{channel_pair, serve_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServiceConfig::default();
//!     let streams = StreamManager::new(config.stream.clone());
//!     streams.start();
//!
//!     let service = TranslationService::from_config(&config, streams.clone());
//!     let result = service.translate("Hello, how are you?").unwrap();
//!
//!     let (sink, source, mut peer) = channel_pair();
//!     tokio::spawn(serve_connection(
//!         streams.clone(),
//!         result.stream_id.to_string(),
//!         Arc::new(sink),
//!         source,
//!         "local".to_string(),
//!     ));
//!
//!     while let Some(message) = peer.recv().await {
//!         println!("{message}");
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod config;
pub mod package;
pub mod pose;
pub mod render;
pub mod stream;
pub mod timeline;
pub mod translate;

pub use codec::{DecodeError, FrameBundle};
pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource, ServiceConfig,
};
pub use package::{
    AnimationArtifact, AnimationEngine, GeneratedAnimation, GenerationError, Resolution, StreamId,
};
pub use pose::{KeyFrame, Pose, PoseError, PoseLibrary, TransitionError, TransitionTable};
pub use render::{FrameRenderer, RenderedFrame};
pub use stream::{PlaybackOutcome, StreamConfig, StreamManager, StreamStats};
pub use timeline::{parse_gloss, Timeline, TimelineBuilder};
pub use translate::{
    HealthReport, ServiceStatus, TranslationResult, TranslationService, ValidationError,
};
