//! Animation Packaging
//!
//! Bundles a rendered timeline into a cacheable [`AnimationArtifact`] and
//! derives the [`StreamId`] a client uses to replay it.
//!
//! # Pipeline
//!
//! ```text
//! gloss ──parse──> tokens ──TimelineBuilder──> Timeline
//!                                                 │
//!                         FrameRenderer <─────────┘
//!                               │
//!                         FrameBundle ──encode──> serialized_frames
//!                               │
//!                      AnimationArtifact + StreamId + stream URL
//! ```
//!
//! [`AnimationEngine::generate_or_fallback`] never fails: when packaging
//! errors it returns a degraded artifact with no frames, `fallback: true`
//! and the error message, under a stream id in the fallback namespace.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::codec::FrameBundle;
use crate::pose::{PoseLibrary, TransitionTable};
use crate::render::{FrameRenderer, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::timeline::{parse_gloss, Timeline, TimelineBuilder};

/// Default playback rate
pub const DEFAULT_FPS: u32 = 30;

/// Default base for stream URLs
pub const DEFAULT_STREAM_BASE_URL: &str = "ws://localhost:8000/avatar/stream";

/// Maximum stream id length accepted from clients
pub const MAX_STREAM_ID_LEN: usize = 128;

const HASH_LEN: usize = 12;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while packaging an animation
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A keyframe holds a NaN or infinite value
    #[error("keyframe {frame} has a non-finite timestamp, duration or joint coordinate")]
    NonFiniteJoint {
        /// Index of the offending keyframe in the timeline
        frame: usize,
    },

    /// The frame bundle could not be serialized
    #[error("failed to serialize frame bundle: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Stream Id
// ============================================================================

/// Identifier a client uses to attach to a cached artifact
///
/// Shape: `<namespace>_<12 hex chars>_<unix seconds>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Namespace for regular artifacts
    pub const NAMESPACE: &'static str = "isl_avatar";

    /// Namespace for degraded fallback artifacts
    pub const FALLBACK_NAMESPACE: &'static str = "avatar_fallback";

    /// Derive an id from the input gloss and its creation time
    ///
    /// The hash covers the gloss and the sub-second timestamp, so two
    /// requests for the same text get distinct ids.
    #[must_use]
    pub fn derive(namespace: &str, gloss: &str, created_at: DateTime<Utc>) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let seconds = created_at.timestamp_micros() as f64 / 1_000_000.0;
        let digest = Sha256::digest(format!("{gloss}{seconds}").as_bytes());
        let hash = hex::encode(digest);

        Self(format!(
            "{namespace}_{}_{}",
            &hash[..HASH_LEN],
            created_at.timestamp()
        ))
    }

    /// Accept a client-supplied id if it has a safe shape
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_stream_id(raw).then(|| Self(raw.to_string()))
    }

    /// The id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `raw` is 1..=128 ASCII alphanumerics, `_` or `-`
#[must_use]
pub fn is_valid_stream_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_STREAM_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

// ============================================================================
// Artifact
// ============================================================================

/// Canvas size in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Packaged, cacheable output of one generation request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationArtifact {
    /// Gloss string the animation was built from
    pub input_gloss: String,
    /// Tokens parsed from the gloss
    pub parsed_tokens: Vec<String>,
    /// Last keyframe timestamp plus its duration
    pub total_duration_seconds: f64,
    /// Frames the animation spans at `fps`
    pub frame_count: u64,
    /// Playback rate
    pub fps: u32,
    /// Canvas size
    pub resolution: Resolution,
    /// Rendered keyframes in the bundle
    pub keyframe_count: usize,
    /// Encoded [`FrameBundle`]; empty for fallback artifacts
    pub serialized_frames: String,
    /// Time spent generating the artifact
    pub processing_time_ms: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Set when generation failed and this is a degraded placeholder
    pub fallback: bool,
    /// Generation error behind a fallback artifact
    pub error: Option<String>,
}

impl AnimationArtifact {
    /// Degraded placeholder with no frames
    #[must_use]
    pub fn fallback(
        input_gloss: &str,
        error: impl Into<String>,
        fps: u32,
        resolution: Resolution,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            input_gloss: input_gloss.to_string(),
            parsed_tokens: parse_gloss(input_gloss),
            total_duration_seconds: 0.0,
            frame_count: 0,
            fps,
            resolution,
            keyframe_count: 0,
            serialized_frames: String::new(),
            processing_time_ms: 0.0,
            created_at,
            fallback: true,
            error: Some(error.into()),
        }
    }
}

/// Frames covered by `duration` seconds at `fps`, rounded down
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn frame_count(fps: u32, duration: f64) -> u64 {
    let frames = (f64::from(fps) * duration + 1e-9).floor();
    if frames.is_finite() && frames > 0.0 {
        frames as u64
    } else {
        0
    }
}

// ============================================================================
// Packager
// ============================================================================

/// Renders timelines and wraps them into artifacts
#[derive(Clone, Copy, Debug)]
pub struct AnimationPackager {
    renderer: FrameRenderer,
    fps: u32,
}

impl Default for AnimationPackager {
    fn default() -> Self {
        Self::new(FrameRenderer::default(), DEFAULT_FPS)
    }
}

impl AnimationPackager {
    /// Create a packager with the given renderer and playback rate
    #[must_use]
    pub fn new(renderer: FrameRenderer, fps: u32) -> Self {
        Self { renderer, fps }
    }

    /// Playback rate
    #[must_use]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Canvas size
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.renderer.width(),
            height: self.renderer.height(),
        }
    }

    /// Render and encode the timeline
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::NonFiniteJoint`] if any keyframe holds a
    /// NaN or infinite value, or [`GenerationError::Serialization`] if the
    /// bundle cannot be encoded.
    pub fn encode_frames(&self, timeline: &Timeline) -> Result<FrameBundle, GenerationError> {
        if let Some(frame) = timeline.keyframes().iter().position(|kf| !kf.is_finite()) {
            return Err(GenerationError::NonFiniteJoint { frame });
        }
        let frames = self.renderer.render_all(timeline.keyframes());
        Ok(FrameBundle::new(
            frames,
            self.fps,
            self.renderer.width(),
            self.renderer.height(),
        ))
    }

    /// Package a timeline into an artifact
    ///
    /// `processing_time_ms` is left at zero for the caller to fill in.
    ///
    /// # Errors
    ///
    /// See [`AnimationPackager::encode_frames`].
    pub fn package(
        &self,
        input_gloss: &str,
        tokens: Vec<String>,
        timeline: &Timeline,
        created_at: DateTime<Utc>,
    ) -> Result<AnimationArtifact, GenerationError> {
        let bundle = self.encode_frames(timeline)?;
        let serialized_frames = bundle.encode()?;
        let total = timeline.total_duration();

        Ok(AnimationArtifact {
            input_gloss: input_gloss.to_string(),
            parsed_tokens: tokens,
            total_duration_seconds: total,
            frame_count: frame_count(self.fps, total),
            fps: self.fps,
            resolution: self.resolution(),
            keyframe_count: bundle.total_frames,
            serialized_frames,
            processing_time_ms: 0.0,
            created_at,
            fallback: false,
            error: None,
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Artifact plus the id and URL a client connects with
#[derive(Clone, Debug)]
pub struct GeneratedAnimation {
    /// Stream id the artifact should be cached under
    pub stream_id: StreamId,
    /// `<stream_base_url>/<stream_id>`
    pub stream_url: String,
    /// The packaged animation
    pub artifact: AnimationArtifact,
}

/// Gloss-to-artifact pipeline
#[derive(Clone, Debug)]
pub struct AnimationEngine {
    library: PoseLibrary,
    transitions: TransitionTable,
    packager: AnimationPackager,
    stream_base_url: String,
}

impl Default for AnimationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FPS, DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl AnimationEngine {
    /// Engine with the built-in poses and transitions
    #[must_use]
    pub fn new(fps: u32, width: u32, height: u32) -> Self {
        Self {
            library: PoseLibrary::builtin(),
            transitions: TransitionTable::builtin(),
            packager: AnimationPackager::new(FrameRenderer::new(width, height), fps),
            stream_base_url: DEFAULT_STREAM_BASE_URL.to_string(),
        }
    }

    /// Replace the pose library
    #[must_use]
    pub fn with_library(mut self, library: PoseLibrary) -> Self {
        self.library = library;
        self
    }

    /// Replace the transition table
    #[must_use]
    pub fn with_transitions(mut self, transitions: TransitionTable) -> Self {
        self.transitions = transitions;
        self
    }

    /// Set the base URL stream ids are appended to
    #[must_use]
    pub fn with_stream_base_url(mut self, base: impl Into<String>) -> Self {
        self.stream_base_url = base.into();
        self
    }

    /// The pose library
    #[must_use]
    pub fn library(&self) -> &PoseLibrary {
        &self.library
    }

    /// The transition table
    #[must_use]
    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    /// Build the timeline for a gloss string
    #[must_use]
    pub fn timeline(&self, gloss: &str) -> Timeline {
        TimelineBuilder::new(&self.library, &self.transitions).build(&parse_gloss(gloss))
    }

    /// URL a client connects to for `stream_id`
    #[must_use]
    pub fn stream_url(&self, stream_id: &StreamId) -> String {
        format!("{}/{stream_id}", self.stream_base_url.trim_end_matches('/'))
    }

    /// Generate the animation for a gloss string
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] if packaging fails.
    pub fn generate(&self, gloss: &str) -> Result<GeneratedAnimation, GenerationError> {
        let started = Instant::now();
        let created_at = Utc::now();

        let tokens = parse_gloss(gloss);
        let timeline = TimelineBuilder::new(&self.library, &self.transitions).build(&tokens);
        let mut artifact = self.packager.package(gloss, tokens, &timeline, created_at)?;
        artifact.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let stream_id = StreamId::derive(StreamId::NAMESPACE, gloss, created_at);
        let stream_url = self.stream_url(&stream_id);

        tracing::info!(
            stream_id = %stream_id,
            keyframes = artifact.keyframe_count,
            duration = artifact.total_duration_seconds,
            elapsed_ms = artifact.processing_time_ms,
            "Generated avatar animation"
        );

        Ok(GeneratedAnimation {
            stream_id,
            stream_url,
            artifact,
        })
    }

    /// Generate the animation, degrading to a fallback artifact on error
    #[must_use]
    pub fn generate_or_fallback(&self, gloss: &str) -> GeneratedAnimation {
        match self.generate(gloss) {
            Ok(generated) => generated,
            Err(e) => {
                tracing::error!(gloss = %gloss, error = %e, "Avatar animation generation failed");

                let created_at = Utc::now();
                let stream_id = StreamId::derive(StreamId::FALLBACK_NAMESPACE, gloss, created_at);
                let artifact = AnimationArtifact::fallback(
                    gloss,
                    e.to_string(),
                    self.packager.fps(),
                    self.packager.resolution(),
                    created_at,
                );
                GeneratedAnimation {
                    stream_url: self.stream_url(&stream_id),
                    stream_id,
                    artifact,
                }
            }
        }
    }
}
