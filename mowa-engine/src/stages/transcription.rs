//! Speech recognition stage

use crate::stage::{SessionContext, Stage, StageFlow};
use async_trait::async_trait;
use mowa_core::config::SpeechToTextConfig;
use mowa_core::{Error, Result, StageKind, Turn, TurnInput};
use std::time::Duration;
use tracing::debug;

/// Narrow interface to a speech-to-text model.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav: &[u8], language: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Posts a WAV container to an OpenAI-compatible `/audio/transcriptions`
/// endpoint and reads the `text` field of the JSON reply.
pub struct HttpTranscriber {
    client: reqwest::Client,
    api_base: String,
    model: String,
}

impl HttpTranscriber {
    pub fn new(config: &SpeechToTextConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, wav: &[u8], language: &str) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::stage(StageKind::SpeechToText, e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let url = format!("{}/audio/transcriptions", self.api_base);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::stage(StageKind::SpeechToText, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::stage(
                StageKind::SpeechToText,
                format!("endpoint returned {}: {}", status, body),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::stage(StageKind::SpeechToText, format!("invalid reply: {}", e)))?;
        body["text"]
            .as_str()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| {
                Error::stage(StageKind::SpeechToText, "reply carried no text field")
            })
    }

    fn name(&self) -> &str {
        "http"
    }
}

pub struct TranscriptionStage {
    transcriber: Box<dyn Transcriber>,
    enabled: bool,
}

impl TranscriptionStage {
    pub fn new(transcriber: Box<dyn Transcriber>, enabled: bool) -> Self {
        Self {
            transcriber,
            enabled,
        }
    }
}

#[async_trait]
impl Stage for TranscriptionStage {
    fn kind(&self) -> StageKind {
        StageKind::SpeechToText
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn process(&self, turn: &mut Turn, ctx: &SessionContext) -> Result<StageFlow> {
        let wav = match &turn.input {
            TurnInput::Audio(bytes) => bytes.clone(),
            // Text input already carries its transcript.
            TurnInput::Text(text) => {
                if turn.transcript.is_none() {
                    turn.transcript = Some(text.clone());
                }
                return Ok(StageFlow::Continue);
            }
        };
        if !self.enabled {
            return Ok(StageFlow::Continue);
        }

        let language = ctx.language();
        let text = self.transcriber.transcribe(&wav, &language).await?;
        if text.is_empty() {
            return Err(Error::stage(StageKind::SpeechToText, "empty transcript"));
        }
        debug!("transcribed {} chars via '{}'", text.len(), self.transcriber.name());
        turn.transcript = Some(text);
        Ok(StageFlow::Continue)
    }
}
