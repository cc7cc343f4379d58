//! Speech synthesis stage

use crate::stage::{SessionContext, Stage, StageFlow};
use async_trait::async_trait;
use mowa_core::config::TextToSpeechConfig;
use mowa_core::media::AudioClip;
use mowa_core::{Error, Result, StageKind, Turn};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const MAX_AUDIO_SIZE: usize = 10 * 1024 * 1024;

/// Narrow interface to a text-to-speech model.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<AudioClip>;

    fn name(&self) -> &str;
}

/// Local neural TTS via the `piper` binary.
pub struct PiperSynthesizer {
    piper_path: PathBuf,
    model_path: PathBuf,
    length_scale: f32,
    timeout: Duration,
}

impl PiperSynthesizer {
    pub fn new(config: &TextToSpeechConfig) -> Result<Self> {
        let piper_path = match &config.piper_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "piper executable not found at {:?}",
                        path
                    )));
                }
                path.clone()
            }
            None => Self::find_piper()?,
        };
        info!("using piper executable {:?}", piper_path);
        Ok(Self {
            piper_path,
            model_path: config.model_path.clone(),
            length_scale: config.length_scale,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn find_piper() -> Result<PathBuf> {
        let output = std::process::Command::new("which").arg("piper").output();
        if let Ok(output) = output {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }
        for candidate in ["/usr/local/bin/piper", "/usr/bin/piper", "/opt/piper/piper"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
        }
        Err(Error::Config(
            "piper executable not found; install piper-tts or set text_to_speech.piper_path"
                .to_string(),
        ))
    }

    /// Keep only characters piper renders well. Polish diacritics included.
    fn filter_text(text: &str) -> String {
        text.chars()
            .filter(|c| {
                c.is_alphanumeric()
                    || c.is_whitespace()
                    || matches!(c, ',' | '.' | '!' | '?' | '-' | ':' | '~')
            })
            .collect()
    }
}

#[async_trait]
impl Synthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<AudioClip> {
        let filtered = Self::filter_text(text);
        if filtered.trim().is_empty() {
            return Err(Error::stage(StageKind::TextToSpeech, "no speakable text"));
        }

        let out_file = tempfile::Builder::new()
            .suffix(".wav")
            .tempfile()
            .map_err(|e| Error::stage(StageKind::TextToSpeech, format!("temp file: {}", e)))?;

        let mut cmd = tokio::process::Command::new(&self.piper_path);
        cmd.arg("--model")
            .arg(&self.model_path)
            .arg("--output_file")
            .arg(out_file.path());
        if (self.length_scale - 1.0).abs() > f32::EPSILON {
            cmd.arg("--length_scale").arg(self.length_scale.to_string());
        }
        if let Some(speaker) = voice.and_then(|v| v.parse::<u32>().ok()) {
            cmd.arg("--speaker").arg(speaker.to_string());
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::stage(StageKind::TextToSpeech, format!("spawn piper: {}", e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(filtered.as_bytes()).await.map_err(|e| {
                Error::stage(StageKind::TextToSpeech, format!("write to piper: {}", e))
            })?;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| Error::stage(StageKind::TextToSpeech, format!("piper: {}", e)))?,
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "piper synthesis exceeded {:?}",
                    self.timeout
                )));
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::stage(
                StageKind::TextToSpeech,
                format!("piper failed: {}", stderr.trim()),
            ));
        }

        let wav = tokio::fs::read(out_file.path())
            .await
            .map_err(|e| Error::stage(StageKind::TextToSpeech, format!("read output: {}", e)))?;
        if wav.len() > MAX_AUDIO_SIZE {
            return Err(Error::stage(
                StageKind::TextToSpeech,
                format!("audio too large ({} bytes)", wav.len()),
            ));
        }
        let clip = AudioClip::from_wav(&wav)?;
        debug!(
            "synthesized {:.2}s of audio at {} Hz",
            clip.duration_seconds(),
            clip.sample_rate()
        );
        Ok(clip)
    }

    fn name(&self) -> &str {
        "piper"
    }
}

pub struct SynthesisStage {
    synthesizer: Box<dyn Synthesizer>,
    enabled: bool,
}

impl SynthesisStage {
    pub fn new(synthesizer: Box<dyn Synthesizer>, enabled: bool) -> Self {
        Self {
            synthesizer,
            enabled,
        }
    }
}

#[async_trait]
impl Stage for SynthesisStage {
    fn kind(&self) -> StageKind {
        StageKind::TextToSpeech
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn process(&self, turn: &mut Turn, ctx: &SessionContext) -> Result<StageFlow> {
        if !self.enabled {
            return Ok(StageFlow::Continue);
        }
        let text = turn
            .response_text
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::stage(StageKind::TextToSpeech, "no response text"))?;
        let voice = ctx.voice_id();
        let clip = self.synthesizer.synthesize(&text, voice.as_deref()).await?;
        turn.response_audio = Some(clip);
        Ok(StageFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_text_keeps_polish() {
        let filtered = PiperSynthesizer::filter_text("Cześć! Jak się masz? $(rm -rf /)`;|");
        assert_eq!(filtered, "Cześć! Jak się masz? rm -rf ");
    }
}
