//! Stage implementations, one module per capability.
//!
//! Each stage wraps an engine behind a narrow trait; the engines are the
//! only place external models are touched.

pub mod generation;
pub mod rendering;
pub mod synthesis;
pub mod transcription;
pub mod voice_activity;

pub use generation::{GenerationStage, OpenAiCompatResponder, Responder, ResponderRequest};
pub use rendering::{HttpRenderer, Renderer, RenderingStage, SampleRenderer};
pub use synthesis::{PiperSynthesizer, SynthesisStage, Synthesizer};
pub use transcription::{HttpTranscriber, Transcriber, TranscriptionStage};
pub use voice_activity::{AlwaysSpeech, EnergyGate, SpeechGate, VoiceActivityStage};
