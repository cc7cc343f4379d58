//! Response generation stage

use crate::stage::{Exchange, SessionContext, Stage, StageFlow};
use async_trait::async_trait;
use mowa_core::config::TextGenerationConfig;
use mowa_core::{Error, Result, StageKind, Turn};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Narrow interface to a language model.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, request: ResponderRequest<'_>) -> Result<String>;

    fn name(&self) -> &str;
}

pub struct ResponderRequest<'a> {
    pub prompt: &'a str,
    pub history: &'a [Exchange],
    pub system_prompt: Option<&'a str>,
    pub temperature: f32,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiCompatResponder {
    client: reqwest::Client,
    api_base: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
}

impl OpenAiCompatResponder {
    pub fn new(config: &TextGenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))?;
        // Only allow characters a model identifier can carry.
        let model: String = config
            .model
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/'))
            .take(100)
            .collect();
        if model.is_empty() {
            return Err(Error::Config("text_generation.model is empty".to_string()));
        }
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model,
            max_tokens: config.max_tokens.min(4096),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Responder for OpenAiCompatResponder {
    async fn respond(&self, request: ResponderRequest<'_>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        for exchange in request.history {
            messages.push(json!({"role": "user", "content": exchange.user}));
            messages.push(json!({"role": "assistant", "content": exchange.assistant}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.clamp(0.0, 2.0),
            "max_tokens": self.max_tokens,
        });

        let url = format!("{}/chat/completions", self.api_base);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        let response = req.send().await.map_err(|e| {
            Error::stage(StageKind::TextGeneration, format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::stage(
                StageKind::TextGeneration,
                format!("endpoint returned {}: {}", status, body),
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            Error::stage(StageKind::TextGeneration, format!("invalid reply: {}", e))
        })?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .map(|c| c.trim().to_string())
            .ok_or_else(|| {
                Error::stage(StageKind::TextGeneration, "reply carried no completion")
            })?;
        if content.is_empty() {
            return Err(Error::stage(StageKind::TextGeneration, "empty completion"));
        }
        Ok(content)
    }

    fn name(&self) -> &str {
        "openai_compatible"
    }
}

pub struct GenerationStage {
    responder: Box<dyn Responder>,
    enabled: bool,
}

impl GenerationStage {
    pub fn new(responder: Box<dyn Responder>, enabled: bool) -> Self {
        Self { responder, enabled }
    }
}

#[async_trait]
impl Stage for GenerationStage {
    fn kind(&self) -> StageKind {
        StageKind::TextGeneration
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn process(&self, turn: &mut Turn, ctx: &SessionContext) -> Result<StageFlow> {
        let prompt = turn
            .transcript
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::stage(StageKind::TextGeneration, "no input text available"))?;

        if !self.enabled {
            // Echo mode keeps the downstream stages fed when generation is off.
            turn.response_text = Some(prompt);
            return Ok(StageFlow::Continue);
        }

        let history = ctx.exchange_snapshot();
        let system_prompt = ctx.system_prompt();
        let response = self
            .responder
            .respond(ResponderRequest {
                prompt: &prompt,
                history: &history,
                system_prompt: system_prompt.as_deref(),
                temperature: ctx.temperature(),
            })
            .await?;
        debug!(
            "generated {} chars via '{}' ({} history exchanges)",
            response.len(),
            self.responder.name(),
            history.len()
        );
        turn.response_text = Some(response);
        Ok(StageFlow::Continue)
    }
}
