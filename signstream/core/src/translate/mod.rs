//! Translation Workflow
//!
//! Request-level orchestration in front of the animation pipeline:
//!
//! ```text
//! text ──validate──> transcribe ──text_to_gloss──> AnimationEngine
//!                                                       │
//!                          StreamManager::store_artifact┘
//!                                                       │
//!                                              TranslationResult
//! ```
//!
//! Generation failures never reach the caller: the engine degrades to a
//! fallback artifact, confidence drops and the service reports itself as
//! degraded in [`HealthReport`].

pub mod gloss;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::package::{AnimationEngine, StreamId};
use crate::stream::StreamManager;

pub use gloss::{text_to_gloss, transcribe};

/// Confidence before adjusting for the generation outcome
pub const BASE_CONFIDENCE: f64 = 0.92;

/// Confidence of a successful translation
pub const SUCCESS_CONFIDENCE: f64 = 0.97;

/// Confidence of a translation that fell back
pub const FALLBACK_CONFIDENCE: f64 = 0.77;

/// Rejected request input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Empty or whitespace-only text
    #[error("audio_text cannot be empty or contain only whitespace")]
    Empty,

    /// Text longer than the configured limit
    #[error("audio_text is {len} characters, the maximum is {max}")]
    TooLong {
        /// Characters in the trimmed text
        len: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Outcome of one translation request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    /// Transcribed input text
    pub source_text: String,
    /// Gloss produced from the text
    pub isl_gloss: String,
    /// Where a client connects to watch the animation
    pub avatar_stream_url: String,
    /// Stream id of the cached animation
    pub stream_id: StreamId,
    /// Translation quality estimate in `[0, 1]`
    pub confidence: f64,
    /// Wall time spent on the request
    pub processing_time_ms: f64,
    /// Whether animation generation fell back
    pub fallback: bool,
}

/// Coarse service health
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Every request so far produced a real animation
    Operational,
    /// At least one request fell back
    Degraded,
}

/// Health snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Always `healthy` while the process answers
    pub status: String,
    /// Whole seconds since the service started
    pub uptime_seconds: u64,
    /// Operational or degraded
    pub service_status: ServiceStatus,
    /// Successful and fallback translations so far
    pub translations_processed: u64,
    /// Time of the snapshot
    pub timestamp: DateTime<Utc>,
}

/// Text-to-animation request handler
pub struct TranslationService {
    engine: AnimationEngine,
    streams: StreamManager,
    max_text_length: usize,
    started: Instant,
    translations: AtomicU64,
    degraded: AtomicBool,
}

impl TranslationService {
    /// Create a service that caches artifacts in `streams`
    #[must_use]
    pub fn new(engine: AnimationEngine, streams: StreamManager, max_text_length: usize) -> Self {
        Self {
            engine,
            streams,
            max_text_length,
            started: Instant::now(),
            translations: AtomicU64::new(0),
            degraded: AtomicBool::new(false),
        }
    }

    /// Create a service from loaded configuration
    #[must_use]
    pub fn from_config(config: &ServiceConfig, streams: StreamManager) -> Self {
        let engine = AnimationEngine::new(config.fps, config.width, config.height)
            .with_stream_base_url(config.stream_base_url.clone());
        Self::new(engine, streams, config.max_text_length)
    }

    /// The stream manager artifacts are cached in
    #[must_use]
    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    /// The animation engine
    #[must_use]
    pub fn engine(&self) -> &AnimationEngine {
        &self.engine
    }

    /// Check request text, returning it trimmed
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for empty or oversized text.
    pub fn validate<'a>(&self, text: &'a str) -> Result<&'a str, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }
        let len = trimmed.chars().count();
        if len > self.max_text_length {
            return Err(ValidationError::TooLong {
                len,
                max: self.max_text_length,
            });
        }
        Ok(trimmed)
    }

    /// Translate text into a cached, streamable animation
    ///
    /// # Errors
    ///
    /// Only input validation fails; generation errors degrade to a fallback.
    pub fn translate(&self, text: &str) -> Result<TranslationResult, ValidationError> {
        let started = Instant::now();
        let text = self.validate(text)?;

        let source_text = transcribe(text);
        let isl_gloss = text_to_gloss(&source_text);
        let generated = self.engine.generate_or_fallback(&isl_gloss);
        let fallback = generated.artifact.fallback;

        self.streams
            .store_artifact(generated.stream_id.as_str(), generated.artifact);
        self.translations.fetch_add(1, Ordering::Relaxed);

        let confidence = if fallback {
            self.degraded.store(true, Ordering::Relaxed);
            FALLBACK_CONFIDENCE
        } else {
            SUCCESS_CONFIDENCE
        };
        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            source = %source_text,
            gloss = %isl_gloss,
            stream_id = %generated.stream_id,
            fallback,
            elapsed_ms = processing_time_ms,
            "Translation completed"
        );

        Ok(TranslationResult {
            source_text,
            isl_gloss,
            avatar_stream_url: generated.stream_url,
            stream_id: generated.stream_id,
            confidence,
            processing_time_ms,
            fallback,
        })
    }

    /// Translations handled so far
    #[must_use]
    pub fn translations_processed(&self) -> u64 {
        self.translations.load(Ordering::Relaxed)
    }

    /// Current service status
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        if self.degraded.load(Ordering::Relaxed) {
            ServiceStatus::Degraded
        } else {
            ServiceStatus::Operational
        }
    }

    /// Health snapshot
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
            service_status: self.status(),
            translations_processed: self.translations_processed(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{KeyFrame, Pose, PoseLibrary};

    fn service() -> TranslationService {
        TranslationService::new(AnimationEngine::default(), StreamManager::default(), 1000)
    }

    #[test]
    fn test_confidence_constants_follow_base() {
        assert!((SUCCESS_CONFIDENCE - (BASE_CONFIDENCE + 0.05).min(0.98)).abs() < 1e-12);
        assert!((FALLBACK_CONFIDENCE - (BASE_CONFIDENCE - 0.15).max(0.75)).abs() < 1e-12);
    }

    #[test]
    fn test_validation() {
        let service = TranslationService::new(AnimationEngine::default(), StreamManager::default(), 5);

        assert_eq!(service.validate(""), Err(ValidationError::Empty));
        assert_eq!(service.validate("  \t "), Err(ValidationError::Empty));
        assert_eq!(service.validate("  hello  "), Ok("hello"));
        assert_eq!(service.validate("héllo"), Ok("héllo"));
        assert_eq!(
            service.validate("hello!"),
            Err(ValidationError::TooLong { len: 6, max: 5 })
        );
    }

    #[test]
    fn test_translate_caches_artifact() {
        let service = service();
        let result = service.translate("Hello, how are you?").unwrap();

        assert_eq!(result.source_text, "Hello, how are you?");
        assert_eq!(result.isl_gloss, "HELLO HOW YOU");
        assert!(!result.fallback);
        assert_eq!(result.confidence, SUCCESS_CONFIDENCE);
        assert!(result.avatar_stream_url.ends_with(result.stream_id.as_str()));

        let artifact = service.streams().artifact(result.stream_id.as_str()).unwrap();
        assert_eq!(artifact.parsed_tokens, vec!["HELLO", "HOW", "YOU"]);
        assert_eq!(service.translations_processed(), 1);
        assert_eq!(service.health().service_status, ServiceStatus::Operational);
    }

    #[test]
    fn test_translate_rejects_before_work() {
        let service = service();
        assert!(service.translate("   ").is_err());
        assert_eq!(service.translations_processed(), 0);
        assert_eq!(service.streams().cached_animations(), 0);
    }

    #[test]
    fn test_fallback_lowers_confidence_and_degrades() {
        let mut library = PoseLibrary::builtin();
        library.insert(
            Pose::new(
                "HELLO",
                vec![KeyFrame::new(0.0, [("head", [f64::INFINITY, 0.0, 0.0])], 0.5)],
                0.2,
            )
            .unwrap(),
        )
        .unwrap();
        let engine = AnimationEngine::default().with_library(library);
        let service = TranslationService::new(engine, StreamManager::default(), 1000);

        let result = service.translate("hello").unwrap();
        assert!(result.fallback);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
        assert!(result.stream_id.as_str().starts_with("avatar_fallback_"));

        let artifact = service.streams().artifact(result.stream_id.as_str()).unwrap();
        assert!(artifact.fallback);

        let health = service.health();
        assert_eq!(health.service_status, ServiceStatus::Degraded);
        assert_eq!(health.translations_processed, 1);
        assert_eq!(health.status, "healthy");
    }

    #[test]
    fn test_from_config_uses_stream_base_url() {
        let config = ServiceConfig {
            stream_base_url: "wss://avatar.example/stream".to_string(),
            ..ServiceConfig::default()
        };
        let service = TranslationService::from_config(&config, StreamManager::default());
        let result = service.translate("yes").unwrap();
        assert!(result
            .avatar_stream_url
            .starts_with("wss://avatar.example/stream/isl_avatar_"));
    }
}
