//! Stage contract and per-session context

use async_trait::async_trait;
use mowa_core::config::{EngineConfig, SessionOverrides};
use mowa_core::media::EncodedFrame;
use mowa_core::{Result, StageKind, Turn};
use parking_lot::RwLock;
use std::sync::Arc;

/// What the pipeline should do after a stage returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFlow {
    Continue,
    /// Voice activity found no speech: terminate the turn early, without an
    /// error and without downstream side effects.
    NoSpeech,
}

/// One completed user/assistant text exchange, kept for generation context.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Shared per-session state handed to every stage.
pub struct SessionContext {
    pub session_id: String,
    pub config: Arc<EngineConfig>,
    pub overrides: RwLock<SessionOverrides>,
    /// Conversation text history the generation stage feeds back to the model
    pub exchanges: RwLock<Vec<Exchange>>,
    /// Idle-animation cache, fetched once at session startup
    pub idle_frames: RwLock<Vec<EncodedFrame>>,
}

impl SessionContext {
    pub fn new(
        session_id: String,
        config: Arc<EngineConfig>,
        overrides: SessionOverrides,
    ) -> Self {
        Self {
            session_id,
            config,
            overrides: RwLock::new(overrides),
            exchanges: RwLock::new(Vec::new()),
            idle_frames: RwLock::new(Vec::new()),
        }
    }

    pub fn language(&self) -> String {
        self.overrides
            .read()
            .language
            .clone()
            .unwrap_or_else(|| self.config.speech_to_text.language.clone())
    }

    pub fn voice_id(&self) -> Option<String> {
        self.overrides.read().voice_id.clone()
    }

    pub fn temperature(&self) -> f32 {
        self.overrides
            .read()
            .temperature
            .unwrap_or(self.config.text_generation.temperature)
    }

    pub fn system_prompt(&self) -> Option<String> {
        self.overrides
            .read()
            .system_prompt
            .clone()
            .or_else(|| self.config.text_generation.system_prompt.clone())
    }

    pub fn exchange_snapshot(&self) -> Vec<Exchange> {
        self.exchanges.read().clone()
    }
}

/// A pipeline unit with one declared capability.
///
/// `process` populates only the turn field(s) the stage owns; a failure is
/// returned as an error and captured on the turn by the pipeline, never
/// thrown across the pipeline boundary. A disabled stage must pass the turn
/// through without breaking downstream field expectations.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn enabled(&self) -> bool {
        true
    }

    async fn process(&self, turn: &mut Turn, ctx: &SessionContext) -> Result<StageFlow>;
}
