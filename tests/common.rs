//! Shared mock engines for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mowa_core::config::EngineConfig;
use mowa_core::media::{AudioClip, EncodedFrame};
use mowa_core::{Error, Result, StageKind};
use mowa_engine::stages::{
    EnergyGate, GenerationStage, Renderer, RenderingStage, Responder, ResponderRequest,
    SynthesisStage, Synthesizer, Transcriber, TranscriptionStage, VoiceActivityStage,
};
use mowa_engine::Pipeline;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MOCK_TRANSCRIPT: &str = "przykładowa transkrypcja";

pub struct MockTranscriber;

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _wav: &[u8], _language: &str) -> Result<String> {
        Ok(MOCK_TRANSCRIPT.to_string())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockResponder {
    pub fail: bool,
    pub delay: Duration,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl Responder for MockResponder {
    async fn respond(&self, request: ResponderRequest<'_>) -> Result<String> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = if self.fail {
            Err(Error::stage(StageKind::TextGeneration, "forced failure"))
        } else {
            Ok(format!("Odpowiedź na: {}", request.prompt))
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockSynthesizer;

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str, _voice: Option<&str>) -> Result<AudioClip> {
        Ok(AudioClip::silence(0.4, 22050))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockRenderer {
    pub frames_per_render: usize,
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, _audio: Option<&AudioClip>, _text: &str) -> Result<Vec<EncodedFrame>> {
        Ok(vec![
            EncodedFrame::new(vec![0xAB]);
            self.frames_per_render
        ])
    }

    async fn idle_frames(&self, count: usize) -> Result<Vec<EncodedFrame>> {
        Ok(vec![EncodedFrame::new(vec![0xCD]); count])
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Pipeline factory over mock engines. The returned counter records the
/// highest number of generation calls ever in flight at once.
pub fn mock_factory(
    fail_generation: bool,
    delay: Duration,
) -> (
    impl Fn(&EngineConfig) -> Result<(Pipeline, Arc<dyn Renderer>)> + Send + Sync + 'static,
    Arc<AtomicUsize>,
) {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let max_handle = Arc::clone(&max_in_flight);
    let factory = move |config: &EngineConfig| {
        let renderer: Arc<dyn Renderer> = Arc::new(MockRenderer {
            frames_per_render: 10,
        });
        let pipeline = Pipeline::new(vec![
            Box::new(VoiceActivityStage::new(
                Box::new(EnergyGate::new(&config.voice_activity)),
                config.voice_activity.enabled,
            )),
            Box::new(TranscriptionStage::new(Box::new(MockTranscriber), true)),
            Box::new(GenerationStage::new(
                Box::new(MockResponder {
                    fail: fail_generation,
                    delay,
                    in_flight: Arc::clone(&in_flight),
                    max_in_flight: Arc::clone(&max_in_flight),
                }),
                true,
            )),
            Box::new(SynthesisStage::new(Box::new(MockSynthesizer), true)),
            Box::new(RenderingStage::new(Arc::clone(&renderer), true)),
        ])?;
        Ok((pipeline, renderer))
    };
    (factory, max_handle)
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.limits.input_queue_depth = 8;
    config.limits.stop_grace_ms = 500;
    config
}

pub fn silence_wav(seconds: f64) -> Bytes {
    let clip = AudioClip::silence(seconds, 16000);
    Bytes::from(clip.to_wav().expect("wav encode"))
}

pub fn speech_wav(seconds: f64) -> Bytes {
    let count = (seconds * 16000.0) as usize;
    let samples: Vec<i16> = (0..count)
        .map(|i| if (i / 40) % 2 == 0 { 12000 } else { -12000 })
        .collect();
    let clip = AudioClip::new(samples, 16000, 1).expect("clip");
    Bytes::from(clip.to_wav().expect("wav encode"))
}
