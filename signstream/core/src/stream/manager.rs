//! Stream Manager
//!
//! Process-wide registry of live connections and cached animation artifacts.
//! It drives paced playback to a connection, answers liveness probes and
//! evicts stale artifacts on a background interval.
//!
//! # Connection Lifecycle
//!
//! ```text
//!   NoConnection ──connect──> Connected ──play──> Streaming ──done──> Idle
//!                                 │                   │                │
//!                                 └──── send failure / close / release ┘
//!                                                 │
//!                                           Disconnected (removed)
//! ```
//!
//! Artifacts live in their own cache and outlive connections: a client can
//! reconnect to the same stream id until the artifact expires.
//!
//! # Concurrency
//!
//! Both maps are `DashMap`s and no map guard is ever held across an
//! `.await`. Every `connect` hands out a unique token; removal by handle
//! only succeeds while that token is still registered, so a superseded
//! connection's teardown never evicts its successor and each registration
//! is removed exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::codec::FrameBundle;
use crate::package::AnimationArtifact;

use super::protocol::{ErrorCode, ServerMessage};
use super::transport::StreamSink;

// ============================================================================
// Configuration
// ============================================================================

/// Timing configuration for the stream manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Silence after which a liveness ping is sent
    pub idle_timeout: Duration,
    /// Age after which a cached artifact is evicted
    pub cache_max_age: Duration,
    /// How often the expiry sweep runs
    pub cleanup_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            cache_max_age: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl StreamConfig {
    /// Short timings for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1),
            cache_max_age: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// State of a registered connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Registered, nothing played yet
    Connected,
    /// Playback in progress
    Streaming,
    /// Playback finished, waiting for client messages
    Idle,
}

struct ConnectionEntry {
    token: u64,
    sink: Arc<dyn StreamSink>,
    connected_at: DateTime<Utc>,
    client_address: String,
    frames_sent: u64,
    last_activity: DateTime<Utc>,
    state: ConnectionState,
}

struct CachedArtifact {
    artifact: Arc<AnimationArtifact>,
    cached_at: Instant,
}

/// A registered connection, as returned by [`StreamManager::connect`]
#[derive(Clone)]
pub struct ConnectionHandle {
    stream_id: String,
    token: u64,
    sink: Arc<dyn StreamSink>,
}

impl ConnectionHandle {
    /// Stream this connection is attached to
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("stream_id", &self.stream_id)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-connection summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    /// Stream id
    pub stream_id: String,
    /// When the client connected
    pub connected_at: DateTime<Utc>,
    /// Messages sent on this connection
    pub frames_sent: u64,
    /// Remote address
    pub client_address: String,
    /// Current state
    pub state: ConnectionState,
    /// Last send or receive
    pub last_activity: DateTime<Utc>,
}

/// Manager-wide statistics snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Registered connections
    pub active_connections: usize,
    /// Cached artifacts
    pub cached_animations: usize,
    /// Messages sent across all connections since startup
    pub total_frames_sent: u64,
    /// One summary per registered connection, ordered by stream id
    pub connections: Vec<ConnectionSummary>,
}

/// How a playback ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// No cached artifact for the stream
    NotFound,
    /// No registered connection for the stream
    NoConnection,
    /// Every frame was delivered
    Completed {
        /// Animation frames delivered
        frames_sent: usize,
    },
    /// A send failed and the connection was released
    Aborted {
        /// Animation frames delivered before the failure
        frames_sent: usize,
    },
    /// The cached blob could not be decoded
    DecodeFailed,
}

// ============================================================================
// Stream Manager
// ============================================================================

struct Inner {
    config: StreamConfig,
    connections: DashMap<String, ConnectionEntry>,
    cache: DashMap<String, CachedArtifact>,
    next_token: AtomicU64,
    total_frames_sent: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    expiry_task: Mutex<Option<JoinHandle<()>>>,
}

/// Shared connection registry and artifact cache
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<Inner>,
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl StreamManager {
    /// Create a manager; call [`StreamManager::start`] to enable expiry
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                connections: DashMap::new(),
                cache: DashMap::new(),
                next_token: AtomicU64::new(1),
                total_frames_sent: AtomicU64::new(0),
                shutdown_tx,
                expiry_task: Mutex::new(None),
            }),
        }
    }

    /// Timing configuration
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Spawn the periodic cache expiry task
    ///
    /// Does nothing if the task is already running or shutdown has begun.
    pub fn start(&self) {
        let mut slot = self.inner.expiry_task.lock();
        if slot.is_some() || self.is_shutting_down() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let period = self.inner.config.cleanup_interval;
        let max_age = self.inner.config.cache_max_age;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let evicted = StreamManager { inner }.expire(max_age);
                        debug!(evicted, "Cache expiry sweep finished");
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("Cache expiry task stopped");
        }));

        info!(
            interval_secs = period.as_secs(),
            max_age_secs = max_age.as_secs(),
            "Cache expiry task started"
        );
    }

    /// Signal shutdown and wait for the expiry task to stop
    ///
    /// Connection sessions watching [`StreamManager::shutdown_signal`] unwind
    /// and release their registrations.
    pub async fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);

        let task = self.inner.expiry_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Cache expiry task ended abnormally");
            }
        }
        info!("Stream manager shut down");
    }

    /// Receiver that flips to `true` when shutdown begins
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    /// Register a connection for a stream
    ///
    /// A second connect on the same id replaces the earlier registration.
    pub fn connect(
        &self,
        stream_id: &str,
        sink: Arc<dyn StreamSink>,
        client_address: impl Into<String>,
    ) -> ConnectionHandle {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let client_address = client_address.into();
        let now = Utc::now();

        let previous = self.inner.connections.insert(
            stream_id.to_string(),
            ConnectionEntry {
                token,
                sink: Arc::clone(&sink),
                connected_at: now,
                client_address: client_address.clone(),
                frames_sent: 0,
                last_activity: now,
                state: ConnectionState::Connected,
            },
        );

        if let Some(previous) = previous {
            info!(
                stream_id = %stream_id,
                previous_client = %previous.client_address,
                "Avatar stream connection replaced"
            );
        }
        info!(stream_id = %stream_id, client = %client_address, "Avatar stream connected");

        ConnectionHandle {
            stream_id: stream_id.to_string(),
            token,
            sink,
        }
    }

    /// Remove a registration if it still belongs to `handle`
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn release(&self, handle: &ConnectionHandle) -> bool {
        let removed = self
            .inner
            .connections
            .remove_if(&handle.stream_id, |_, entry| entry.token == handle.token);

        match removed {
            Some((stream_id, entry)) => {
                log_disconnect(&stream_id, &entry);
                true
            }
            None => false,
        }
    }

    /// Remove whatever connection is registered for a stream
    ///
    /// The cached artifact is kept.
    pub fn disconnect(&self, stream_id: &str) -> bool {
        match self.inner.connections.remove(stream_id) {
            Some((stream_id, entry)) => {
                log_disconnect(&stream_id, &entry);
                true
            }
            None => false,
        }
    }

    /// The connection currently registered for a stream
    #[must_use]
    pub fn current_handle(&self, stream_id: &str) -> Option<ConnectionHandle> {
        self.inner
            .connections
            .get(stream_id)
            .map(|entry| ConnectionHandle {
                stream_id: stream_id.to_string(),
                token: entry.token,
                sink: Arc::clone(&entry.sink),
            })
    }

    /// Whether `handle` is still the registered connection for its stream
    #[must_use]
    pub fn is_registered(&self, handle: &ConnectionHandle) -> bool {
        self.inner
            .connections
            .get(&handle.stream_id)
            .is_some_and(|entry| entry.token == handle.token)
    }

    /// Whether any connection is registered for a stream
    #[must_use]
    pub fn is_connected(&self, stream_id: &str) -> bool {
        self.inner.connections.contains_key(stream_id)
    }

    /// Record client activity on a connection
    pub fn touch(&self, handle: &ConnectionHandle) {
        self.update_entry(handle, |entry| entry.last_activity = Utc::now());
    }

    fn set_state(&self, handle: &ConnectionHandle, state: ConnectionState) {
        self.update_entry(handle, |entry| entry.state = state);
    }

    fn update_entry(&self, handle: &ConnectionHandle, update: impl FnOnce(&mut ConnectionEntry)) {
        if let Some(mut entry) = self.inner.connections.get_mut(&handle.stream_id) {
            if entry.token == handle.token {
                update(&mut entry);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Artifact Cache
    // ------------------------------------------------------------------------

    /// Cache an artifact, replacing any earlier one for the stream
    pub fn store_artifact(&self, stream_id: &str, artifact: AnimationArtifact) {
        let fallback = artifact.fallback;
        self.inner.cache.insert(
            stream_id.to_string(),
            CachedArtifact {
                artifact: Arc::new(artifact),
                cached_at: Instant::now(),
            },
        );
        info!(stream_id = %stream_id, fallback, "Cached animation data");
    }

    /// The cached artifact for a stream
    #[must_use]
    pub fn artifact(&self, stream_id: &str) -> Option<Arc<AnimationArtifact>> {
        self.inner
            .cache
            .get(stream_id)
            .map(|entry| Arc::clone(&entry.artifact))
    }

    /// Evict artifacts cached longer than `max_age`, returning how many went
    pub fn expire(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        self.inner.cache.retain(|stream_id, entry| {
            let keep = now.duration_since(entry.cached_at) <= max_age;
            if !keep {
                evicted += 1;
                info!(stream_id = %stream_id, "Cleaned up expired animation cache");
            }
            keep
        });

        evicted
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Send one message on a connection
    ///
    /// On transport failure the connection is released and `false` returned.
    pub async fn send_to(&self, handle: &ConnectionHandle, message: &ServerMessage) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(stream_id = %handle.stream_id, kind = message.kind(), error = %e, "Failed to serialize message");
                return false;
            }
        };

        match handle.sink.send_text(text).await {
            Ok(()) => {
                self.inner.total_frames_sent.fetch_add(1, Ordering::Relaxed);
                self.update_entry(handle, |entry| {
                    entry.frames_sent += 1;
                    entry.last_activity = Utc::now();
                });
                true
            }
            Err(e) => {
                warn!(stream_id = %handle.stream_id, kind = message.kind(), error = %e, "Failed to send frame");
                self.release(handle);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------------

    /// Play the cached artifact to whatever connection is registered
    pub async fn play(&self, stream_id: &str) -> PlaybackOutcome {
        match self.current_handle(stream_id) {
            Some(handle) => self.play_on(&handle).await,
            None if !self.inner.cache.contains_key(stream_id) => {
                error!(stream_id = %stream_id, "No animation data found for stream");
                PlaybackOutcome::NotFound
            }
            None => {
                warn!(stream_id = %stream_id, "No active connection for stream");
                PlaybackOutcome::NoConnection
            }
        }
    }

    /// Play the cached artifact to a specific connection
    ///
    /// Sends `animation_metadata`, frames spaced `1/fps` apart and a closing
    /// `animation_complete`. A fallback artifact skips straight from
    /// metadata to completion.
    pub async fn play_on(&self, handle: &ConnectionHandle) -> PlaybackOutcome {
        let stream_id = handle.stream_id.as_str();

        let Some(artifact) = self.artifact(stream_id) else {
            error!(stream_id = %stream_id, "No animation data found for stream");
            let not_found =
                ServerMessage::error(stream_id, ErrorCode::AnimationNotFound, "Animation data not available");
            self.send_to(handle, &not_found).await;
            return PlaybackOutcome::NotFound;
        };

        self.set_state(handle, ConnectionState::Streaming);
        let outcome = self.stream_artifact(handle, &artifact).await;
        self.set_state(handle, ConnectionState::Idle);

        debug!(stream_id = %stream_id, ?outcome, "Playback finished");
        outcome
    }

    async fn stream_artifact(&self, handle: &ConnectionHandle, artifact: &AnimationArtifact) -> PlaybackOutcome {
        let stream_id = handle.stream_id.as_str();

        if !self.send_to(handle, &ServerMessage::metadata(stream_id, artifact)).await {
            return PlaybackOutcome::Aborted { frames_sent: 0 };
        }

        if artifact.fallback {
            let complete = ServerMessage::complete(stream_id, 0, artifact.total_duration_seconds);
            return if self.send_to(handle, &complete).await {
                PlaybackOutcome::Completed { frames_sent: 0 }
            } else {
                PlaybackOutcome::Aborted { frames_sent: 0 }
            };
        }

        let bundle = match FrameBundle::decode(&artifact.serialized_frames) {
            Ok(bundle) => bundle,
            Err(e) => {
                error!(stream_id = %stream_id, error = %e, "Failed to decode animation data");
                let decode_error =
                    ServerMessage::error(stream_id, ErrorCode::DecodeError, "Failed to decode animation data");
                self.send_to(handle, &decode_error).await;
                return PlaybackOutcome::DecodeFailed;
            }
        };

        let fps = bundle.fps.max(1);
        let frame_interval = Duration::from_secs_f64(1.0 / f64::from(fps));
        info!(stream_id = %stream_id, frames = bundle.frames.len(), fps, "Streaming animation frames");

        let mut frames_sent = 0;
        for frame in bundle.frames {
            if frames_sent > 0 {
                tokio::time::sleep(frame_interval).await;
            }
            if !self.send_to(handle, &ServerMessage::frame(stream_id, frame)).await {
                return PlaybackOutcome::Aborted { frames_sent };
            }
            frames_sent += 1;
        }

        let complete = ServerMessage::complete(stream_id, frames_sent, artifact.total_duration_seconds);
        if self.send_to(handle, &complete).await {
            PlaybackOutcome::Completed { frames_sent }
        } else {
            PlaybackOutcome::Aborted { frames_sent }
        }
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Registered connections
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.connections.len()
    }

    /// Cached artifacts
    #[must_use]
    pub fn cached_animations(&self) -> usize {
        self.inner.cache.len()
    }

    /// Snapshot of manager-wide statistics
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        let mut connections: Vec<ConnectionSummary> = self
            .inner
            .connections
            .iter()
            .map(|entry| ConnectionSummary {
                stream_id: entry.key().clone(),
                connected_at: entry.connected_at,
                frames_sent: entry.frames_sent,
                client_address: entry.client_address.clone(),
                state: entry.state,
                last_activity: entry.last_activity,
            })
            .collect();
        connections.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));

        StreamStats {
            active_connections: connections.len(),
            cached_animations: self.inner.cache.len(),
            total_frames_sent: self.inner.total_frames_sent.load(Ordering::Relaxed),
            connections,
        }
    }
}

fn log_disconnect(stream_id: &str, entry: &ConnectionEntry) {
    let duration = (Utc::now() - entry.connected_at).num_milliseconds();
    #[allow(clippy::cast_precision_loss)]
    let duration_secs = duration as f64 / 1000.0;
    info!(
        stream_id = %stream_id,
        duration_secs,
        frames_sent = entry.frames_sent,
        "Avatar stream disconnected"
    );
}
