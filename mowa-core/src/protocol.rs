//! JSON wire protocol for the per-session WebSocket connection.
//!
//! Messages are JSON objects discriminated by a `type` field. Both halves are
//! defined here so the server transport and the playback client share one
//! vocabulary.

use crate::config::SessionOverrides;
use crate::error::Error;
use crate::turn::{InputKind, Turn};
use chrono::Utc;
use serde::{Deserialize, Serialize};

fn default_frame_count() -> usize {
    30
}

/// Client → server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    TextMessage {
        text: String,
        /// Idle-frame bootstrap: when set, the reply carries only video_frames
        /// and the text is not processed.
        #[serde(default)]
        get_idle_frames: bool,
        #[serde(default = "default_frame_count")]
        frame_count: usize,
    },
    AudioChunk {
        /// Base64-encoded WAV container
        audio_data: String,
    },
    ConfigUpdate {
        config: SessionOverrides,
    },
    Ping,
}

/// Server → client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        session_id: String,
        timestamp: f64,
    },
    ProcessingStarted {
        timestamp: f64,
    },
    TextProcessed {
        response_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_data: Option<String>,
        video_frames: Vec<String>,
        processing_time: f64,
        timestamp: f64,
    },
    AudioProcessed {
        transcribed_text: String,
        response_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_data: Option<String>,
        video_frames: Vec<String>,
        processing_time: f64,
        timestamp: f64,
    },
    ConfigUpdated {
        timestamp: f64,
    },
    Pong {
        timestamp: f64,
    },
    Error {
        error_type: String,
        message: String,
    },
}

/// Epoch seconds with sub-second precision, the timestamp format the
/// protocol carries.
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

impl ServerMessage {
    pub fn error(err: &Error) -> Self {
        ServerMessage::Error {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
        }
    }

    /// Map a completed turn to its client emission.
    ///
    /// A skipped turn (voice activity found no speech) produces nothing; an
    /// errored turn produces an `error` message; everything else becomes
    /// `text_processed` or `audio_processed` by input kind.
    pub fn from_turn(turn: &Turn) -> Option<Self> {
        if turn.skipped {
            return None;
        }
        if let Some(err) = &turn.error {
            return Some(ServerMessage::Error {
                error_type: "stage_error".to_string(),
                message: err.to_string(),
            });
        }

        let audio_data = match &turn.response_audio {
            Some(clip) => match clip.to_base64_wav() {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    return Some(ServerMessage::Error {
                        error_type: e.error_type().to_string(),
                        message: e.to_string(),
                    });
                }
            },
            None => None,
        };
        let video_frames = turn
            .response_frames
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|f| f.to_base64())
            .collect();
        let response_text = turn.response_text.clone().unwrap_or_default();
        let processing_time = turn.processing_time();
        let timestamp = now_timestamp();

        Some(match turn.input_kind() {
            InputKind::Text => ServerMessage::TextProcessed {
                response_text,
                audio_data,
                video_frames,
                processing_time,
                timestamp,
            },
            InputKind::Audio => ServerMessage::AudioProcessed {
                transcribed_text: turn.transcript.clone().unwrap_or_default(),
                response_text,
                audio_data,
                video_frames,
                processing_time,
                timestamp,
            },
        })
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

impl ClientMessage {
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::TransportDecode(format!("invalid message: {}", e)))
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}
