//! Stage registry
//!
//! Maps the configuration enums to engine constructors. The set of engines
//! is closed: adding one means adding a variant here, not loading modules
//! at runtime.

use crate::pipeline::Pipeline;
use crate::stages::{
    AlwaysSpeech, EnergyGate, GenerationStage, HttpRenderer, HttpTranscriber,
    OpenAiCompatResponder, PiperSynthesizer, Renderer, RenderingStage, SampleRenderer,
    SpeechGate, SynthesisStage, Transcriber, TranscriptionStage, VoiceActivityStage,
};
use mowa_core::config::{
    EngineConfig, RendererKind, ResponderKind, SpeechGateKind, SynthesizerKind, TranscriberKind,
};
use mowa_core::Result;
use std::sync::Arc;

/// Build the stage chain and the renderer handle for one session.
///
/// The renderer is returned separately so the session can fetch its idle
/// frames once at startup without reaching into the pipeline.
pub fn build_components(config: &EngineConfig) -> Result<(Pipeline, Arc<dyn Renderer>)> {
    let gate: Box<dyn SpeechGate> = match config.voice_activity.engine {
        SpeechGateKind::Energy => Box::new(EnergyGate::new(&config.voice_activity)),
        SpeechGateKind::Always => Box::new(AlwaysSpeech),
    };
    let transcriber: Box<dyn Transcriber> = match config.speech_to_text.engine {
        TranscriberKind::Http => Box::new(HttpTranscriber::new(&config.speech_to_text)?),
    };
    let responder = match config.text_generation.engine {
        ResponderKind::OpenaiCompatible => {
            Box::new(OpenAiCompatResponder::new(&config.text_generation)?)
        }
    };
    let synthesizer = match config.text_to_speech.engine {
        SynthesizerKind::Piper => Box::new(PiperSynthesizer::new(&config.text_to_speech)?),
    };
    let renderer: Arc<dyn Renderer> = match config.video_synthesis.engine {
        RendererKind::Sample => Arc::new(SampleRenderer::new(&config.video_synthesis)?),
        RendererKind::Http => Arc::new(HttpRenderer::new(&config.video_synthesis)?),
    };

    let pipeline = Pipeline::new(vec![
        Box::new(VoiceActivityStage::new(gate, config.voice_activity.enabled)),
        Box::new(TranscriptionStage::new(
            transcriber,
            config.speech_to_text.enabled,
        )),
        Box::new(GenerationStage::new(
            responder,
            config.text_generation.enabled,
        )),
        Box::new(SynthesisStage::new(
            synthesizer,
            config.text_to_speech.enabled,
        )),
        Box::new(RenderingStage::new(
            Arc::clone(&renderer),
            config.video_synthesis.enabled,
        )),
    ])?;

    Ok((pipeline, renderer))
}
