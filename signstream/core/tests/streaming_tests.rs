//! Streaming Integration Tests
//!
//! Drives full client sessions over the in-process channel transport with
//! paused tokio time, so frame pacing and idle pings run instantly.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::task::JoinHandle;

use signstream_core::stream::{
    channel_pair, serve_connection, ChannelPeer, PlaybackOutcome, SessionEnd, StreamConfig,
    StreamManager,
};
use signstream_core::{AnimationEngine, GeneratedAnimation, TranslationService};

// =============================================================================
// Helpers
// =============================================================================

fn cache(manager: &StreamManager, gloss: &str) -> GeneratedAnimation {
    let generated = AnimationEngine::default().generate_or_fallback(gloss);
    manager.store_artifact(generated.stream_id.as_str(), generated.artifact.clone());
    generated
}

fn spawn_session(manager: &StreamManager, stream_id: &str) -> (JoinHandle<SessionEnd>, ChannelPeer) {
    let (sink, source, peer) = channel_pair();
    let session = tokio::spawn(serve_connection(
        manager.clone(),
        stream_id.to_string(),
        Arc::new(sink),
        source,
        "192.168.1.20:51000".to_string(),
    ));
    (session, peer)
}

async fn next(peer: &mut ChannelPeer) -> Value {
    let text = peer.recv().await.expect("server closed the connection");
    serde_json::from_str(&text).expect("server sent invalid JSON")
}

/// Read messages up to and including `animation_complete`
async fn until_complete(peer: &mut ChannelPeer) -> Vec<Value> {
    let mut messages = Vec::new();
    loop {
        let message = next(peer).await;
        let done = message["type"] == "animation_complete";
        messages.push(message);
        if done {
            return messages;
        }
    }
}

fn types(messages: &[Value]) -> Vec<&str> {
    messages.iter().map(|m| m["type"].as_str().unwrap()).collect()
}

// =============================================================================
// Playback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_streams_full_animation() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "HELLO");
    let stream_id = generated.stream_id.as_str();

    let (session, mut peer) = spawn_session(&manager, stream_id);
    let messages = until_complete(&mut peer).await;

    assert_eq!(
        types(&messages),
        vec![
            "animation_metadata",
            "animation_frame",
            "animation_frame",
            "animation_frame",
            "animation_frame",
            "animation_complete",
        ]
    );

    let metadata = &messages[0]["data"];
    assert_eq!(metadata["gloss_input"], "HELLO");
    assert_eq!(metadata["frame_count"], 69);
    assert_eq!(metadata["fps"], 30);
    assert_eq!(metadata["resolution"], "400x600");

    for (index, frame) in messages[1..5].iter().enumerate() {
        assert_eq!(frame["stream_id"], stream_id);
        assert_eq!(frame["data"]["frame_number"], index);
    }

    let complete = &messages[5]["data"];
    assert_eq!(complete["frames_sent"], 4);
    assert!((complete["total_duration"].as_f64().unwrap() - 2.3).abs() < 1e-9);

    drop(peer);
    assert_eq!(session.await.unwrap(), SessionEnd::ClientClosed);
    assert_eq!(manager.active_connections(), 0);
    assert_eq!(manager.cached_animations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_frames_are_paced_at_fps() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "HELLO YOU");
    let frames = {
        let artifact = manager.artifact(generated.stream_id.as_str()).unwrap();
        artifact.keyframe_count
    };

    let (sink, _source, mut peer) = channel_pair();
    let handle = manager.connect(generated.stream_id.as_str(), Arc::new(sink), "local");

    let started = tokio::time::Instant::now();
    let outcome = manager.play_on(&handle).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, PlaybackOutcome::Completed { frames_sent: frames });
    let interval = Duration::from_secs_f64(1.0 / 30.0);
    let gaps = u32::try_from(frames - 1).unwrap();
    assert!(elapsed >= interval * gaps);
    assert!(elapsed < interval * (gaps + 1));

    let mut received = 0;
    while peer.try_recv().is_some() {
        received += 1;
    }
    assert_eq!(received, frames + 2);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_artifact_streams_without_frames() {
    let manager = StreamManager::new(StreamConfig::default());
    let artifact = signstream_core::AnimationArtifact::fallback(
        "HELLO",
        "renderer unavailable",
        30,
        signstream_core::Resolution { width: 400, height: 600 },
        chrono::Utc::now(),
    );
    manager.store_artifact("avatar_fallback_abc_1", artifact);

    let (_session, mut peer) = spawn_session(&manager, "avatar_fallback_abc_1");
    let messages = until_complete(&mut peer).await;

    assert_eq!(types(&messages), vec!["animation_metadata", "animation_complete"]);
    assert_eq!(messages[0]["data"]["fallback"], true);
    assert_eq!(messages[0]["data"]["error"], "renderer unavailable");
    assert_eq!(messages[1]["data"]["frames_sent"], 0);
}

// =============================================================================
// Missing and Expired Artifacts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_missing_artifact_sends_one_error() {
    let manager = StreamManager::new(StreamConfig::default());
    let (sink, _source, mut peer) = channel_pair();
    let handle = manager.connect("isl_avatar_000000000000_1", Arc::new(sink), "local");

    assert_eq!(manager.play_on(&handle).await, PlaybackOutcome::NotFound);

    let error: Value = serde_json::from_str(&peer.try_recv().unwrap()).unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["stream_id"], "isl_avatar_000000000000_1");
    assert_eq!(error["error"]["code"], "ANIMATION_NOT_FOUND");
    assert_eq!(peer.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn test_expired_artifact_behaves_like_missing() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "YES");
    let stream_id = generated.stream_id.as_str();

    let (sink, _source, mut peer) = channel_pair();
    let _handle = manager.connect(stream_id, Arc::new(sink), "local");

    tokio::time::advance(Duration::from_secs(3601)).await;
    assert_eq!(manager.expire(Duration::from_secs(3600)), 1);

    assert_eq!(manager.play(stream_id).await, PlaybackOutcome::NotFound);
    let error: Value = serde_json::from_str(&peer.try_recv().unwrap()).unwrap();
    assert_eq!(error["error"]["code"], "ANIMATION_NOT_FOUND");
    assert_eq!(peer.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn test_session_survives_unknown_stream() {
    let manager = StreamManager::new(StreamConfig::default());
    let (session, mut peer) = spawn_session(&manager, "isl_avatar_ffffffffffff_9");

    let error = next(&mut peer).await;
    assert_eq!(error["error"]["code"], "ANIMATION_NOT_FOUND");

    peer.send(r#"{"type":"ping"}"#).await.unwrap();
    assert_eq!(next(&mut peer).await["type"], "pong");

    drop(peer);
    assert_eq!(session.await.unwrap(), SessionEnd::ClientClosed);
}

// =============================================================================
// Client Messages
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_ping_gets_pong_before_anything_else() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "THANK-YOU");

    let (_session, mut peer) = spawn_session(&manager, generated.stream_id.as_str());
    until_complete(&mut peer).await;

    peer.send(r#"{"type":"ping"}"#).await.unwrap();
    assert_eq!(next(&mut peer).await["type"], "pong");
    assert_eq!(peer.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replays_animation() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "NO");

    let (_session, mut peer) = spawn_session(&manager, generated.stream_id.as_str());
    let first = until_complete(&mut peer).await;

    peer.send(r#"{"type":"restart_animation"}"#).await.unwrap();
    let second = until_complete(&mut peer).await;

    assert_eq!(types(&first), types(&second));
    assert_eq!(first[0]["data"], second[0]["data"]);
}

#[tokio::test(start_paused = true)]
async fn test_get_stats_reports_connection() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "HELLO");
    let stream_id = generated.stream_id.as_str();

    let (_session, mut peer) = spawn_session(&manager, stream_id);
    let played = until_complete(&mut peer).await.len();

    peer.send(r#"{"type":"get_stats"}"#).await.unwrap();
    let stats = next(&mut peer).await;

    assert_eq!(stats["type"], "stats");
    assert_eq!(stats["data"]["active_connections"], 1);
    assert_eq!(stats["data"]["cached_animations"], 1);
    assert_eq!(stats["data"]["total_frames_sent"], played);
    let connection = &stats["data"]["connections"][0];
    assert_eq!(connection["stream_id"], stream_id);
    assert_eq!(connection["client_address"], "192.168.1.20:51000");
    assert_eq!(connection["state"], "idle");
}

#[tokio::test(start_paused = true)]
async fn test_garbage_and_unknown_messages_are_ignored() {
    let manager = StreamManager::new(StreamConfig::default());
    let (session, mut peer) = spawn_session(&manager, "isl_avatar_ffffffffffff_9");
    next(&mut peer).await;

    peer.send("not json at all").await.unwrap();
    peer.send(r#"{"type":"dance"}"#).await.unwrap();
    peer.send(r#"{"type":"ping"}"#).await.unwrap();

    assert_eq!(next(&mut peer).await["type"], "pong");
    assert!(!session.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_idle_connection_gets_pinged() {
    let manager = StreamManager::new(StreamConfig::for_testing());
    let generated = cache(&manager, "YES");

    let (_session, mut peer) = spawn_session(&manager, generated.stream_id.as_str());
    until_complete(&mut peer).await;

    let before = tokio::time::Instant::now();
    let ping = next(&mut peer).await;
    assert_eq!(ping["type"], "ping");
    assert!(before.elapsed() >= StreamConfig::for_testing().idle_timeout);
}

// =============================================================================
// Failure and Replacement
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_client_gone_mid_stream_releases_connection() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "HELLO HOW YOU");

    let (session, mut peer) = spawn_session(&manager, generated.stream_id.as_str());
    assert_eq!(next(&mut peer).await["type"], "animation_metadata");
    assert_eq!(next(&mut peer).await["type"], "animation_frame");
    drop(peer.from_server);

    assert_eq!(session.await.unwrap(), SessionEnd::SendFailed);
    assert_eq!(manager.active_connections(), 0);
    assert!(manager.artifact(generated.stream_id.as_str()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replaces_earlier_connection() {
    let manager = StreamManager::new(StreamConfig::default());
    let generated = cache(&manager, "YES");
    let stream_id = generated.stream_id.as_str();

    let (first, mut first_peer) = spawn_session(&manager, stream_id);
    until_complete(&mut first_peer).await;
    let (_second, mut second_peer) = spawn_session(&manager, stream_id);
    until_complete(&mut second_peer).await;

    drop(first_peer);
    assert_eq!(first.await.unwrap(), SessionEnd::ClientClosed);

    assert_eq!(manager.active_connections(), 1);
    assert!(manager.is_connected(stream_id));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_all_sessions() {
    let manager = StreamManager::new(StreamConfig::default());
    manager.start();
    let a = cache(&manager, "HELLO");
    let b = cache(&manager, "NO");

    let (session_a, mut peer_a) = spawn_session(&manager, a.stream_id.as_str());
    let (session_b, mut peer_b) = spawn_session(&manager, b.stream_id.as_str());
    until_complete(&mut peer_a).await;
    until_complete(&mut peer_b).await;
    assert_eq!(manager.active_connections(), 2);

    manager.shutdown().await;

    assert_eq!(session_a.await.unwrap(), SessionEnd::Shutdown);
    assert_eq!(session_b.await.unwrap(), SessionEnd::Shutdown);
    assert_eq!(manager.active_connections(), 0);
}

// =============================================================================
// End to End
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_translate_then_stream() {
    let manager = StreamManager::new(StreamConfig::default());
    let service = TranslationService::new(AnimationEngine::default(), manager.clone(), 1000);

    let result = service.translate("Hello, how are you?").unwrap();
    assert_eq!(result.isl_gloss, "HELLO HOW YOU");
    assert!(!result.fallback);

    let (_session, mut peer) = spawn_session(&manager, result.stream_id.as_str());
    let messages = until_complete(&mut peer).await;

    let metadata = &messages[0]["data"];
    assert_eq!(metadata["gloss_input"], "HELLO HOW YOU");
    assert_eq!(metadata["parsed_words"], serde_json::json!(["HELLO", "HOW", "YOU"]));
    assert_eq!(metadata["fallback"], false);

    let frames = messages.iter().filter(|m| m["type"] == "animation_frame").count();
    assert_eq!(messages.last().unwrap()["data"]["frames_sent"], frames);
    assert_eq!(service.health().translations_processed, 1);
}
