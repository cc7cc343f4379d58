//! Wire-format checks for the WebSocket protocol.

use mowa_core::config::SessionOverrides;
use mowa_core::protocol::{ClientMessage, ServerMessage};
use serde_json::json;

#[test]
fn test_client_vocabulary() {
    let text = ClientMessage::from_json(r#"{"type":"text_message","text":"Cześć"}"#).unwrap();
    assert!(matches!(text, ClientMessage::TextMessage { .. }));

    let audio = ClientMessage::from_json(r#"{"type":"audio_chunk","audio_data":"AAAA"}"#).unwrap();
    assert!(matches!(audio, ClientMessage::AudioChunk { .. }));

    let ping = ClientMessage::from_json(r#"{"type":"ping"}"#).unwrap();
    assert!(matches!(ping, ClientMessage::Ping));

    let config =
        ClientMessage::from_json(r#"{"type":"config_update","config":{"language":"en"}}"#).unwrap();
    match config {
        ClientMessage::ConfigUpdate { config } => assert_eq!(config.language.as_deref(), Some("en")),
        _ => panic!("wrong variant"),
    }
}

#[test]
fn test_config_update_ignores_unknown_fields() {
    let message = ClientMessage::from_json(
        r#"{"type":"config_update","config":{"language":"pl","gpu_count":4,"theme":"dark"}}"#,
    )
    .unwrap();
    match message {
        ClientMessage::ConfigUpdate { config } => {
            assert_eq!(config.language.as_deref(), Some("pl"));
            assert!(config.voice_id.is_none());
        }
        _ => panic!("wrong variant"),
    }
}

#[test]
fn test_unknown_client_type_is_a_decode_error() {
    let err = ClientMessage::from_json(r#"{"type":"fire_missiles"}"#).unwrap_err();
    assert_eq!(err.error_type(), "transport_decode_error");
}

#[test]
fn test_idle_bootstrap_flag_round_trip() {
    let message = ClientMessage::TextMessage {
        text: String::new(),
        get_idle_frames: true,
        frame_count: 24,
    };
    let json = message.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["type"], "text_message");
    assert_eq!(value["get_idle_frames"], true);
    assert_eq!(value["frame_count"], 24);
}

#[test]
fn test_server_message_shapes() {
    let established = ServerMessage::ConnectionEstablished {
        session_id: "abc".to_string(),
        timestamp: 1.5,
    };
    let value: serde_json::Value =
        serde_json::from_str(&established.to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "connection_established");
    assert_eq!(value["session_id"], "abc");

    let processed = ServerMessage::TextProcessed {
        response_text: "odpowiedź".to_string(),
        audio_data: None,
        video_frames: vec!["aGVqa28=".to_string()],
        processing_time: 0.25,
        timestamp: 2.0,
    };
    let value: serde_json::Value = serde_json::from_str(&processed.to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "text_processed");
    assert!(value.get("audio_data").is_none(), "absent audio is omitted");
    assert_eq!(value["video_frames"].as_array().unwrap().len(), 1);
}

#[test]
fn test_server_message_client_side_parse() {
    // The playback client parses the same enum the server serializes.
    let wire = json!({
        "type": "audio_processed",
        "transcribed_text": "dzień dobry",
        "response_text": "Dzień dobry!",
        "video_frames": ["AA==", "AQ=="],
        "processing_time": 1.25,
        "timestamp": 10.0,
    })
    .to_string();
    let message: ServerMessage = serde_json::from_str(&wire).unwrap();
    match message {
        ServerMessage::AudioProcessed {
            transcribed_text,
            audio_data,
            video_frames,
            ..
        } => {
            assert_eq!(transcribed_text, "dzień dobry");
            assert!(audio_data.is_none());
            assert_eq!(video_frames.len(), 2);
        }
        other => panic!("expected audio_processed, got {:?}", other),
    }
}

#[test]
fn test_error_message_carries_stable_type() {
    let err = mowa_core::Error::Backpressure;
    let message = ServerMessage::error(&err);
    let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["error_type"], "backpressure");
    assert!(!value["message"].as_str().unwrap().is_empty());
}

#[test]
fn test_overrides_default_shape() {
    let overrides: SessionOverrides = serde_json::from_str("{}").unwrap();
    assert!(overrides.language.is_none());
    assert!(overrides.temperature.is_none());
}
