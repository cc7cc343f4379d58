//! Voice-activity gate
//!
//! Decides whether an audio chunk carries speech at all. A negative verdict
//! is the one place a turn terminates early without an error.

use crate::stage::{SessionContext, Stage, StageFlow};
use async_trait::async_trait;
use mowa_core::config::VoiceActivityConfig;
use mowa_core::media::AudioClip;
use mowa_core::{Error, Result, StageKind, Turn, TurnInput};
use tracing::{debug, warn};

/// Narrow interface to a speech/no-speech decision.
#[async_trait]
pub trait SpeechGate: Send + Sync {
    async fn has_speech(&self, clip: &AudioClip) -> Result<bool>;

    fn name(&self) -> &str;
}

/// RMS-energy gate over windows of decoded PCM.
///
/// A window counts as speech when its normalized RMS exceeds the threshold;
/// the chunk passes when enough windows carry speech.
pub struct EnergyGate {
    energy_threshold: f32,
    min_speech_ratio: f32,
}

const WINDOW_SIZE: usize = 512;

impl EnergyGate {
    pub fn new(config: &VoiceActivityConfig) -> Self {
        Self {
            energy_threshold: config.energy_threshold,
            min_speech_ratio: config.min_speech_ratio,
        }
    }

    fn window_rms(window: &[i16]) -> f32 {
        if window.is_empty() {
            return 0.0;
        }
        let sum: f64 = window
            .iter()
            .map(|s| {
                let normalized = *s as f64 / i16::MAX as f64;
                normalized * normalized
            })
            .sum();
        (sum / window.len() as f64).sqrt() as f32
    }
}

#[async_trait]
impl SpeechGate for EnergyGate {
    async fn has_speech(&self, clip: &AudioClip) -> Result<bool> {
        let samples = clip.samples();
        if samples.is_empty() {
            return Ok(false);
        }
        let mut speech_windows = 0usize;
        let mut total_windows = 0usize;
        for window in samples.chunks(WINDOW_SIZE) {
            total_windows += 1;
            if Self::window_rms(window) > self.energy_threshold {
                speech_windows += 1;
            }
        }
        let ratio = speech_windows as f32 / total_windows as f32;
        debug!(
            "energy gate: {}/{} windows above threshold (ratio {:.3})",
            speech_windows, total_windows, ratio
        );
        Ok(ratio >= self.min_speech_ratio)
    }

    fn name(&self) -> &str {
        "energy"
    }
}

/// Pass-through gate: every chunk is treated as speech.
pub struct AlwaysSpeech;

#[async_trait]
impl SpeechGate for AlwaysSpeech {
    async fn has_speech(&self, _clip: &AudioClip) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "always"
    }
}

pub struct VoiceActivityStage {
    gate: Box<dyn SpeechGate>,
    enabled: bool,
}

impl VoiceActivityStage {
    pub fn new(gate: Box<dyn SpeechGate>, enabled: bool) -> Self {
        Self { gate, enabled }
    }
}

#[async_trait]
impl Stage for VoiceActivityStage {
    fn kind(&self) -> StageKind {
        StageKind::VoiceActivity
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn process(&self, turn: &mut Turn, _ctx: &SessionContext) -> Result<StageFlow> {
        let wav = match &turn.input {
            TurnInput::Audio(bytes) => bytes,
            TurnInput::Text(_) => return Ok(StageFlow::Continue),
        };
        if !self.enabled {
            return Ok(StageFlow::Continue);
        }
        let clip = AudioClip::from_wav(wav)
            .map_err(|e| Error::stage(StageKind::VoiceActivity, e.to_string()))?;
        match self.gate.has_speech(&clip).await {
            Ok(true) => Ok(StageFlow::Continue),
            Ok(false) => Ok(StageFlow::NoSpeech),
            Err(e) => {
                // A broken gate must not swallow user speech.
                warn!(
                    "speech gate '{}' failed ({}), assuming speech",
                    self.gate.name(),
                    e
                );
                Ok(StageFlow::Continue)
            }
        }
    }
}
