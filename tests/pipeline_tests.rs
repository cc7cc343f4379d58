//! End-to-end pipeline scenarios over mock engines.

mod common;

use common::*;
use mowa_core::protocol::ServerMessage;
use mowa_core::{StageKind, TurnInput};
use mowa_engine::SessionManager;
use std::time::Duration;

#[tokio::test]
async fn test_text_message_produces_full_reply() {
    let (factory, _) = mock_factory(false, Duration::from_millis(5));
    let manager = SessionManager::with_factory(test_config(), factory).unwrap();
    let session = manager.create_session(Default::default()).await.unwrap();
    let mut output = session.take_output().unwrap();

    session.submit(TurnInput::Text("Cześć".to_string())).unwrap();
    let turn = output.recv().await.expect("turn emitted");

    assert!(turn.error.is_none());
    assert!(!turn.skipped);
    assert_eq!(turn.transcript.as_deref(), Some("Cześć"));
    assert!(!turn.response_text.as_deref().unwrap_or_default().is_empty());
    assert!(turn.response_audio.is_some());
    assert!(!turn.response_frames.as_deref().unwrap_or_default().is_empty());
    assert!(turn.processing_time() > 0.0);

    match ServerMessage::from_turn(&turn) {
        Some(ServerMessage::TextProcessed {
            response_text,
            video_frames,
            processing_time,
            ..
        }) => {
            assert!(!response_text.is_empty());
            assert!(!video_frames.is_empty());
            assert!(processing_time > 0.0);
        }
        other => panic!("expected text_processed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_audio_message_produces_transcribed_reply() {
    let (factory, _) = mock_factory(false, Duration::from_millis(5));
    let manager = SessionManager::with_factory(test_config(), factory).unwrap();
    let session = manager.create_session(Default::default()).await.unwrap();
    let mut output = session.take_output().unwrap();

    session.submit(TurnInput::Audio(speech_wav(1.0))).unwrap();
    let turn = output.recv().await.expect("turn emitted");

    assert!(turn.error.is_none());
    assert_eq!(turn.transcript.as_deref(), Some(MOCK_TRANSCRIPT));
    assert!(turn.response_text.is_some());

    match ServerMessage::from_turn(&turn) {
        Some(ServerMessage::AudioProcessed {
            transcribed_text, ..
        }) => assert_eq!(transcribed_text, MOCK_TRANSCRIPT),
        other => panic!("expected audio_processed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_silence_short_circuits_without_error() {
    let (factory, max_in_flight) = mock_factory(false, Duration::ZERO);
    let manager = SessionManager::with_factory(test_config(), factory).unwrap();
    let session = manager.create_session(Default::default()).await.unwrap();
    let mut output = session.take_output().unwrap();

    session.submit(TurnInput::Audio(silence_wav(1.0))).unwrap();
    let turn = output.recv().await.expect("turn emitted");

    assert!(turn.skipped);
    assert!(turn.error.is_none());
    assert!(turn.transcript.is_none());
    assert!(turn.response_text.is_none());
    // No emission for a skipped turn.
    assert!(ServerMessage::from_turn(&turn).is_none());
    // Downstream stages never ran.
    assert_eq!(max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_generation_failure_preserves_partial_results() {
    let (factory, _) = mock_factory(true, Duration::ZERO);
    let manager = SessionManager::with_factory(test_config(), factory).unwrap();
    let session = manager.create_session(Default::default()).await.unwrap();
    let mut output = session.take_output().unwrap();

    session.submit(TurnInput::Audio(speech_wav(1.0))).unwrap();
    let turn = output.recv().await.expect("turn emitted even on failure");

    assert_eq!(turn.transcript.as_deref(), Some(MOCK_TRANSCRIPT));
    assert!(turn.response_text.is_none());
    assert!(turn.response_frames.is_none());
    let error = turn.error.as_ref().expect("stage error captured");
    assert_eq!(error.stage, StageKind::TextGeneration);

    match ServerMessage::from_turn(&turn) {
        Some(ServerMessage::Error { error_type, .. }) => assert_eq!(error_type, "stage_error"),
        other => panic!("expected error message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_text_turn_bypasses_voice_activity() {
    // Text input must reach generation even though the gate would reject
    // an empty audio signal.
    let (factory, _) = mock_factory(false, Duration::ZERO);
    let manager = SessionManager::with_factory(test_config(), factory).unwrap();
    let session = manager.create_session(Default::default()).await.unwrap();
    let mut output = session.take_output().unwrap();

    session.submit(TurnInput::Text("sama cisza".to_string())).unwrap();
    let turn = output.recv().await.unwrap();
    assert!(!turn.skipped);
    assert!(turn.response_text.is_some());
}

#[tokio::test]
async fn test_history_feeds_following_turns() {
    let (factory, _) = mock_factory(false, Duration::ZERO);
    let manager = SessionManager::with_factory(test_config(), factory).unwrap();
    let session = manager.create_session(Default::default()).await.unwrap();
    let mut output = session.take_output().unwrap();

    session.submit(TurnInput::Text("pierwsze".to_string())).unwrap();
    output.recv().await.unwrap();
    session.submit(TurnInput::Text("drugie".to_string())).unwrap();
    output.recv().await.unwrap();

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].transcript.as_deref(), Some("pierwsze"));
    assert_eq!(history[1].transcript.as_deref(), Some("drugie"));
    assert!(history.iter().all(|t| t.is_completed()));
}
