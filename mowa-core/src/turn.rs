//! Conversation turn data model
//! One Turn is a full request/response cycle: one user input through to one
//! synthesized reply. Fields populate monotonically as the turn moves through
//! the pipeline; once completed the turn is immutable.

use crate::media::{AudioClip, EncodedFrame};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage capability tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    VoiceActivity,
    SpeechToText,
    TextGeneration,
    TextToSpeech,
    VideoSynthesis,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::VoiceActivity => "voice_activity",
            StageKind::SpeechToText => "speech_to_text",
            StageKind::TextGeneration => "text_generation",
            StageKind::TextToSpeech => "text_to_speech",
            StageKind::VideoSynthesis => "video_synthesis",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "voice_activity" => Some(StageKind::VoiceActivity),
            "speech_to_text" => Some(StageKind::SpeechToText),
            "text_generation" => Some(StageKind::TextGeneration),
            "text_to_speech" => Some(StageKind::TextToSpeech),
            "video_synthesis" => Some(StageKind::VideoSynthesis),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Active,
    Processing,
    Idle,
    Closing,
    Closed,
}

impl SessionState {
    /// New input is accepted in every state except Closing and Closed.
    pub fn accepts_input(&self) -> bool {
        !matches!(self, SessionState::Closing | SessionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Active => "active",
            SessionState::Processing => "processing",
            SessionState::Idle => "idle",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// Raw user input carried by a turn
#[derive(Debug, Clone)]
pub enum TurnInput {
    Text(String),
    /// WAV container bytes as received from the client
    Audio(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Audio,
}

impl TurnInput {
    pub fn kind(&self) -> InputKind {
        match self {
            TurnInput::Text(_) => InputKind::Text,
            TurnInput::Audio(_) => InputKind::Audio,
        }
    }
}

/// Failure captured on a turn when a stage errors out.
/// Kept on the turn rather than propagated so partial results survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnError {
    pub stage: StageKind,
    pub message: String,
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.message)
    }
}

/// One full request/response cycle through the pipeline
#[derive(Debug, Clone)]
pub struct Turn {
    pub turn_id: String,
    pub input: TurnInput,
    pub transcript: Option<String>,
    pub response_text: Option<String>,
    pub response_audio: Option<AudioClip>,
    pub response_frames: Option<Vec<EncodedFrame>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<TurnError>,
    /// Set only by the voice-activity early exit; a skipped turn is not an error
    /// and produces no client-visible emission.
    pub skipped: bool,
}

impl Turn {
    pub fn new(input: TurnInput) -> Self {
        // Text input needs no recognition, so the transcript is known up front.
        let transcript = match &input {
            TurnInput::Text(text) => Some(text.clone()),
            TurnInput::Audio(_) => None,
        };
        Self {
            turn_id: Uuid::new_v4().to_string(),
            input,
            transcript,
            response_text: None,
            response_audio: None,
            response_frames: None,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            skipped: false,
        }
    }

    pub fn input_kind(&self) -> InputKind {
        self.input.kind()
    }

    /// Seal the turn. The first call wins; later calls are no-ops.
    pub fn complete(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Wall-clock processing time in seconds.
    pub fn processing_time(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        let micros = (end - self.started_at).num_microseconds().unwrap_or(0).max(0);
        micros as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_turn_has_transcript_up_front() {
        let turn = Turn::new(TurnInput::Text("Cześć".to_string()));
        assert_eq!(turn.transcript.as_deref(), Some("Cześć"));
        assert_eq!(turn.input_kind(), InputKind::Text);
    }

    #[test]
    fn test_audio_turn_starts_without_transcript() {
        let turn = Turn::new(TurnInput::Audio(Bytes::from_static(&[0u8; 4])));
        assert!(turn.transcript.is_none());
        assert_eq!(turn.input_kind(), InputKind::Audio);
    }

    #[test]
    fn test_complete_is_sealed() {
        let mut turn = Turn::new(TurnInput::Text("hi".to_string()));
        assert!(!turn.is_completed());
        turn.complete();
        let first = turn.completed_at;
        turn.complete();
        assert_eq!(turn.completed_at, first);
    }

    #[test]
    fn test_state_accepts_input() {
        assert!(SessionState::Created.accepts_input());
        assert!(SessionState::Active.accepts_input());
        assert!(SessionState::Processing.accepts_input());
        assert!(SessionState::Idle.accepts_input());
        assert!(!SessionState::Closing.accepts_input());
        assert!(!SessionState::Closed.accepts_input());
    }

    #[test]
    fn test_stage_kind_round_trip() {
        for kind in [
            StageKind::VoiceActivity,
            StageKind::SpeechToText,
            StageKind::TextGeneration,
            StageKind::TextToSpeech,
            StageKind::VideoSynthesis,
        ] {
            assert_eq!(StageKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(StageKind::from_str("unknown"), None);
    }
}
