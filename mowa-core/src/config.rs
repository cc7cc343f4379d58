//! Engine configuration
//!
//! Every stage section selects one engine from a closed set and carries that
//! engine's recognized options. All values have working defaults; deployments
//! override them from a config file or environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: SessionLimits,
    pub voice_activity: VoiceActivityConfig,
    pub speech_to_text: SpeechToTextConfig,
    pub text_generation: TextGenerationConfig,
    pub text_to_speech: TextToSpeechConfig,
    pub video_synthesis: VideoSynthesisConfig,
    pub player: PlayerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: SessionLimits::default(),
            voice_activity: VoiceActivityConfig::default(),
            speech_to_text: SpeechToTextConfig::default(),
            text_generation: TextGenerationConfig::default(),
            text_to_speech: TextToSpeechConfig::default(),
            video_synthesis: VideoSynthesisConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.limits.validate()?;
        self.voice_activity.validate()?;
        self.text_generation.validate()?;
        self.text_to_speech.validate()?;
        self.video_synthesis.validate()?;
        self.player.validate()?;
        Ok(())
    }
}

/// Session manager limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Maximum concurrent sessions
    pub max_sessions: usize,

    /// Idle seconds after which the sweep closes a session
    pub session_timeout_secs: u64,

    /// How often the background sweep runs
    pub sweep_interval_secs: u64,

    /// Bounded input queue depth per session
    pub input_queue_depth: usize,

    /// Grace period for draining in-flight work on stop
    pub stop_grace_ms: u64,

    /// Conversation history cap per session
    pub history_cap: usize,

    /// Maximum accepted text input length
    pub max_text_length: usize,

    /// Maximum accepted audio payload in bytes
    pub max_audio_bytes: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            session_timeout_secs: 3600,
            sweep_interval_secs: 5,
            input_queue_depth: 1,
            stop_grace_ms: 2000,
            history_cap: 50,
            max_text_length: 1000,
            max_audio_bytes: 10 * 1024 * 1024,
        }
    }
}

impl SessionLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sessions == 0 {
            return Err("max_sessions must be at least 1".to_string());
        }
        if self.input_queue_depth == 0 {
            return Err("input_queue_depth must be at least 1".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Voice-activity gate engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechGateKind {
    /// RMS-energy gate over the decoded PCM
    Energy,
    /// Pass-through: every chunk is treated as speech
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceActivityConfig {
    pub enabled: bool,
    pub engine: SpeechGateKind,
    /// Normalized RMS threshold a window must exceed to count as speech
    pub energy_threshold: f32,
    /// Fraction of windows that must carry speech for the chunk to pass
    pub min_speech_ratio: f32,
}

impl Default for VoiceActivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: SpeechGateKind::Energy,
            energy_threshold: 0.01,
            min_speech_ratio: 0.05,
        }
    }
}

impl VoiceActivityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.energy_threshold) {
            return Err("energy_threshold must be within 0.0-1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_speech_ratio) {
            return Err("min_speech_ratio must be within 0.0-1.0".to_string());
        }
        Ok(())
    }
}

/// Speech recognition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriberKind {
    /// OpenAI-compatible `/audio/transcriptions` endpoint
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechToTextConfig {
    pub enabled: bool,
    pub engine: TranscriberKind,
    pub api_base: String,
    pub model: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for SpeechToTextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: TranscriberKind::Http,
            api_base: "http://localhost:9000/v1".to_string(),
            model: "faster-whisper-large-v3".to_string(),
            language: "pl".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Response generation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    /// OpenAI-compatible `/chat/completions` endpoint
    OpenaiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenerationConfig {
    pub enabled: bool,
    pub engine: ResponderKind,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TextGenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: ResponderKind::OpenaiCompatible,
            api_base: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:7b".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            system_prompt: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl TextGenerationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("temperature must be within 0.0-2.0".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Speech synthesis engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesizerKind {
    /// Local piper binary
    Piper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextToSpeechConfig {
    pub enabled: bool,
    pub engine: SynthesizerKind,
    /// Explicit piper executable; discovered on PATH when unset
    pub piper_path: Option<PathBuf>,
    pub model_path: PathBuf,
    pub sample_rate: u32,
    /// Piper speed control: 1.0 = normal, lower = faster
    pub length_scale: f32,
    pub timeout_secs: u64,
}

impl Default for TextToSpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: SynthesizerKind::Piper,
            piper_path: None,
            model_path: PathBuf::from("models/piper/pl_PL-mls_6892-medium.onnx"),
            sample_rate: 22050,
            length_scale: 1.0,
            timeout_secs: 10,
        }
    }
}

impl TextToSpeechConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample_rate must be non-zero".to_string());
        }
        if !(0.1..=4.0).contains(&self.length_scale) {
            return Err("length_scale must be within 0.1-4.0".to_string());
        }
        Ok(())
    }
}

/// Avatar rendering engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// Cycle a directory of prepared frames to span the audio duration
    Sample,
    /// External renderer service
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSynthesisConfig {
    pub enabled: bool,
    pub engine: RendererKind,
    /// Frame directory for the sample renderer
    pub frames_dir: PathBuf,
    /// Endpoint for the http renderer
    pub api_base: Option<String>,
    /// Production frame rate the renderer targets
    pub fps: u32,
    /// Frames served for the idle-animation bootstrap
    pub idle_frame_count: usize,
    pub timeout_secs: u64,
}

impl Default for VideoSynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: RendererKind::Sample,
            frames_dir: PathBuf::from("assets/avatar_frames"),
            api_base: None,
            fps: 25,
            idle_frame_count: 30,
            timeout_secs: 30,
        }
    }
}

impl VideoSynthesisConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.fps == 0 {
            return Err("fps must be non-zero".to_string());
        }
        if self.idle_frame_count == 0 {
            return Err("idle_frame_count must be at least 1".to_string());
        }
        if self.engine == RendererKind::Http && self.api_base.is_none() {
            return Err("http renderer requires api_base".to_string());
        }
        Ok(())
    }
}

/// Client-side playback tunables. Deployment defaults, not hard constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Idle "breathing" loop tick rate
    pub idle_tick_hz: f64,
    /// Speaking-mode frame rate clamp band
    pub min_fps: f64,
    pub max_fps: f64,
    /// Rate used when audio fails to decode or play
    pub fallback_fps: f64,
    /// Frames blended at partial opacity on Idle/Speaking switches
    pub blend_frames: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            idle_tick_hz: 4.0,
            min_fps: 15.0,
            max_fps: 30.0,
            fallback_fps: 25.0,
            blend_frames: 3,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.idle_tick_hz <= 0.0 {
            return Err("idle_tick_hz must be positive".to_string());
        }
        if self.min_fps <= 0.0 || self.max_fps < self.min_fps {
            return Err("fps band must satisfy 0 < min_fps <= max_fps".to_string());
        }
        if self.fallback_fps <= 0.0 {
            return Err("fallback_fps must be positive".to_string());
        }
        Ok(())
    }
}

/// Per-session overrides accepted at session creation and via config_update.
/// Unknown fields are ignored; absent fields keep the engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOverrides {
    pub language: Option<String>,
    pub voice_id: Option<String>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

impl SessionOverrides {
    /// Overlay `other` on top of self, field by field.
    pub fn merge(&mut self, other: &SessionOverrides) {
        if other.language.is_some() {
            self.language = other.language.clone();
        }
        if other.voice_id.is_some() {
            self.voice_id = other.voice_id.clone();
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.system_prompt.is_some() {
            self.system_prompt = other.system_prompt.clone();
        }
    }
}
