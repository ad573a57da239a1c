//! Frame Bundle Codec
//!
//! Rendered frames travel as one opaque blob: the [`FrameBundle`] is
//! serialized to compact JSON and then base64-encoded (standard alphabet,
//! padded). Field order is fixed by the struct layout and joint maps are
//! ordered, so equal bundles always encode to identical bytes.
//!
//! ```text
//! FrameBundle --serde_json--> bytes --base64--> serialized_frames
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::RenderedFrame;

/// Format tag carried in every bundle
pub const BUNDLE_FORMAT: &str = "isl_animation_data";

/// Bundle format version
pub const BUNDLE_VERSION: &str = "1.0";

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Errors raised when decoding a serialized frame blob
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The blob is not valid base64
    #[error("invalid base64: {0}")]
    Base64(String),

    /// The decoded bytes are not a valid bundle
    #[error("invalid frame bundle: {0}")]
    Json(#[from] serde_json::Error),

    /// The bundle carries an unknown format tag
    #[error("unsupported bundle format {format:?} version {version:?}")]
    UnsupportedFormat {
        /// Format tag found in the bundle
        format: String,
        /// Version found in the bundle
        version: String,
    },
}

// ============================================================================
// Base64
// ============================================================================

/// Encode bytes as padded standard base64
#[must_use]
pub fn base64_encode(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len().div_ceil(3) * 4);

    for chunk in bytes.chunks(3) {
        let mut n: u32 = 0;
        for (i, &byte) in chunk.iter().enumerate() {
            n |= u32::from(byte) << (16 - i * 8);
        }

        let char_count = chunk.len() + 1;
        for i in 0..char_count {
            let idx = ((n >> (18 - i * 6)) & 0x3F) as usize;
            result.push(char::from(ALPHABET[idx]));
        }
        for _ in char_count..4 {
            result.push('=');
        }
    }

    result
}

/// Decode padded standard base64
///
/// Padding is only accepted at the end of the input.
///
/// # Errors
///
/// Returns [`DecodeError::Base64`] on a bad length, an invalid character or
/// misplaced padding.
pub fn base64_decode(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    fn value(c: u8) -> Result<u32, DecodeError> {
        match c {
            b'A'..=b'Z' => Ok(u32::from(c - b'A')),
            b'a'..=b'z' => Ok(u32::from(c - b'a') + 26),
            b'0'..=b'9' => Ok(u32::from(c - b'0') + 52),
            b'+' => Ok(62),
            b'/' => Ok(63),
            _ => Err(DecodeError::Base64(format!(
                "invalid character {:?}",
                char::from(c)
            ))),
        }
    }

    let input = encoded.trim().as_bytes();
    if input.len() % 4 != 0 {
        return Err(DecodeError::Base64(format!(
            "length {} is not a multiple of 4",
            input.len()
        )));
    }

    let chunk_count = input.len() / 4;
    let mut result = Vec::with_capacity(chunk_count * 3);

    for (index, chunk) in input.chunks(4).enumerate() {
        let last = index + 1 == chunk_count;
        let padding = match (chunk[2], chunk[3]) {
            (b'=', b'=') => 2,
            (_, b'=') => 1,
            (b'=', _) => return Err(DecodeError::Base64("misplaced padding".to_string())),
            _ => 0,
        };
        if padding > 0 && !last {
            return Err(DecodeError::Base64("padding before end of input".to_string()));
        }

        let mut n = (value(chunk[0])? << 18) | (value(chunk[1])? << 12);
        if padding < 2 {
            n |= value(chunk[2])? << 6;
        }
        if padding < 1 {
            n |= value(chunk[3])?;
        }

        result.push((n >> 16) as u8);
        if padding < 2 {
            result.push((n >> 8) as u8);
        }
        if padding < 1 {
            result.push(n as u8);
        }
    }

    Ok(result)
}

// ============================================================================
// Frame Bundle
// ============================================================================

/// Every rendered frame plus sequence metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameBundle {
    /// Format tag, always [`BUNDLE_FORMAT`]
    pub format: String,
    /// Format version, always [`BUNDLE_VERSION`]
    pub version: String,
    /// Rendered frames in playback order
    pub frames: Vec<RenderedFrame>,
    /// Number of rendered frames
    pub total_frames: usize,
    /// Last frame timestamp plus its duration
    pub duration: f64,
    /// Playback rate
    pub fps: u32,
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
}

impl FrameBundle {
    /// Wrap rendered frames with sequence metadata
    #[must_use]
    pub fn new(frames: Vec<RenderedFrame>, fps: u32, width: u32, height: u32) -> Self {
        let duration = frames.last().map_or(0.0, |f| f.timestamp + f.duration);
        Self {
            format: BUNDLE_FORMAT.to_string(),
            version: BUNDLE_VERSION.to_string(),
            total_frames: frames.len(),
            frames,
            duration,
            fps,
            width,
            height,
        }
    }

    /// Serialize to the opaque transport blob
    ///
    /// # Errors
    ///
    /// Returns the JSON error if a frame cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(base64_encode(&json))
    }

    /// Parse a transport blob produced by [`FrameBundle::encode`]
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the blob is not base64, not a JSON bundle
    /// or carries a different format tag.
    pub fn decode(blob: &str) -> Result<Self, DecodeError> {
        let bytes = base64_decode(blob)?;
        let bundle: Self = serde_json::from_slice(&bytes)?;
        if bundle.format != BUNDLE_FORMAT || bundle.version != BUNDLE_VERSION {
            return Err(DecodeError::UnsupportedFormat {
                format: bundle.format,
                version: bundle.version,
            });
        }
        Ok(bundle)
    }
}
