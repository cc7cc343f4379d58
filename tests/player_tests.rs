//! Sync player properties: idle loop liveness, frame-rate derivation,
//! transition smoothing.

mod common;

use common::*;
use mowa_core::config::PlayerConfig;
use mowa_core::media::{AudioClip, EncodedFrame, FrameBatch};
use mowa_engine::SessionManager;
use mowa_player::{PlayerMode, SyncPlayer};
use std::time::Duration;

fn frames(n: usize) -> Vec<EncodedFrame> {
    (0..n).map(|i| EncodedFrame::new(vec![i as u8])).collect()
}

#[test]
fn test_idle_loop_survives_ten_thousand_ticks() {
    let mut player = SyncPlayer::new(PlayerConfig::default(), frames(30)).unwrap();
    for _ in 0..10_000 {
        assert_eq!(player.mode(), PlayerMode::Idle);
        assert!(player.frame_index() < 30);
        player.tick();
    }
    assert_eq!(player.mode(), PlayerMode::Idle);
}

#[test]
fn test_fps_derivation_round_trip() {
    let config = PlayerConfig::default();
    let cases = [
        (50usize, 2.0f64),
        (100, 4.0),
        (30, 1.0),
        (300, 10.0),
        (10, 4.0),  // 2.5 fps natural, clamps up
        (400, 4.0), // 100 fps natural, clamps down
    ];
    for (frame_count, duration) in cases {
        let audio = AudioClip::silence(duration, 16000);
        let batch = FrameBatch::new(frames(frame_count), Some(audio));
        let fps = batch.derived_fps(config.min_fps, config.max_fps).unwrap();
        assert!(
            (config.min_fps..=config.max_fps).contains(&fps),
            "fps {} out of band for {} frames / {}s",
            fps,
            frame_count,
            duration
        );
        let natural = frame_count as f64 / duration;
        if (config.min_fps..=config.max_fps).contains(&natural) {
            // Unclamped: the frames span the true audio duration to within
            // one frame interval.
            assert!(
                (frame_count as f64 / fps - duration).abs() <= 1.0 / fps,
                "{} frames at {} fps drifts from {}s",
                frame_count,
                fps,
                duration
            );
        }
    }
}

#[test]
fn test_speaking_playback_full_cycle() {
    let mut player = SyncPlayer::new(PlayerConfig::default(), frames(8)).unwrap();
    let audio = AudioClip::silence(2.0, 16000);
    player
        .play(FrameBatch::new(frames(50), Some(audio)))
        .unwrap();
    assert_eq!(player.mode(), PlayerMode::Speaking);
    assert!((player.current_fps() - 25.0).abs() < 1e-9);

    for _ in 0..50 {
        player.tick();
    }
    // Back in idle, resumed from the middle of the idle sequence.
    assert_eq!(player.mode(), PlayerMode::Idle);
    assert_eq!(player.frame_index(), 4);
}

#[test]
fn test_switch_blends_against_previous_frame() {
    let config = PlayerConfig::default();
    let blend = config.blend_frames;
    let mut player = SyncPlayer::new(config, frames(8)).unwrap();
    let idle_frame = player.tick().frame;

    player.play(FrameBatch::new(frames(20), None)).unwrap();
    let first = player.tick();
    assert!(first.opacity < 1.0);
    assert_eq!(first.underlay.as_ref(), Some(&idle_frame));

    let mut last_opacity = first.opacity;
    for _ in 1..blend {
        let next = player.tick();
        assert!(next.opacity > last_opacity);
        assert!(next.underlay.is_some());
        last_opacity = next.opacity;
    }
    let settled = player.tick();
    assert!((settled.opacity - 1.0).abs() < f32::EPSILON);
    assert!(settled.underlay.is_none());
}

#[test]
fn test_audio_failure_does_not_block_video() {
    // A batch whose audio the client could not decode still plays, at the
    // fallback rate.
    let config = PlayerConfig::default();
    let mut player = SyncPlayer::new(config.clone(), frames(4)).unwrap();
    player.play(FrameBatch::new(frames(25), None)).unwrap();
    assert_eq!(player.mode(), PlayerMode::Speaking);
    assert!((player.current_fps() - config.fallback_fps).abs() < 1e-9);
    for _ in 0..25 {
        player.tick();
    }
    assert_eq!(player.mode(), PlayerMode::Idle);
}

#[tokio::test]
async fn test_session_idle_bootstrap_seeds_player() {
    let (factory, _) = mock_factory(false, Duration::ZERO);
    let manager = SessionManager::with_factory(test_config(), factory).unwrap();
    let session = manager.create_session(Default::default()).await.unwrap();

    let idle = session.idle_frames(16);
    assert_eq!(idle.len(), 16);
    let mut player = SyncPlayer::new(PlayerConfig::default(), idle).unwrap();
    for _ in 0..100 {
        player.tick();
    }
    assert_eq!(player.mode(), PlayerMode::Idle);
}
