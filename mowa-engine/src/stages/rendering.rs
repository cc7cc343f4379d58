//! Avatar rendering stage
//!
//! Produces the ordered frame sequence that plays in lock-step with the
//! synthesized audio, plus the idle frames used to seed the client's
//! resting animation.

use crate::stage::{SessionContext, Stage, StageFlow};
use async_trait::async_trait;
use mowa_core::config::VideoSynthesisConfig;
use mowa_core::media::{AudioClip, EncodedFrame};
use mowa_core::{Error, Result, StageKind, Turn};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Duration assumed when a turn carries no audio to span.
const DEFAULT_RENDER_SECONDS: f64 = 2.0;

/// Narrow interface to an avatar renderer.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render the speech animation for one reply.
    async fn render(&self, audio: Option<&AudioClip>, text: &str) -> Result<Vec<EncodedFrame>>;

    /// Frames for the idle "breathing" loop, fetched once per session.
    async fn idle_frames(&self, count: usize) -> Result<Vec<EncodedFrame>>;

    fn name(&self) -> &str;
}

/// Index into a ping-pong traversal of `len` source frames, so cycled
/// sequences reverse at the ends instead of snapping back to the start.
pub(crate) fn ping_pong_index(i: usize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let p = i % period;
    if p < len {
        p
    } else {
        period - p
    }
}

/// Cycles a directory of prepared frames to span the audio duration.
/// Stands in for a neural renderer in deployments without one.
pub struct SampleRenderer {
    source: Vec<EncodedFrame>,
    fps: u32,
}

impl SampleRenderer {
    pub fn new(config: &VideoSynthesisConfig) -> Result<Self> {
        let source = Self::load_frames(&config.frames_dir)?;
        Ok(Self {
            source,
            fps: config.fps,
        })
    }

    pub fn with_frames(source: Vec<EncodedFrame>, fps: u32) -> Result<Self> {
        if source.is_empty() {
            return Err(Error::Config("frame source is empty".to_string()));
        }
        Ok(Self { source, fps })
    }

    fn load_frames(dir: &Path) -> Result<Vec<EncodedFrame>> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| Error::Config(format!("cannot read frames_dir {:?}: {}", dir, e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png")
                )
            })
            .collect();
        paths.sort();
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let data = std::fs::read(&path)?;
            frames.push(EncodedFrame::new(data));
        }
        if frames.is_empty() {
            return Err(Error::Config(format!(
                "frames_dir {:?} contains no image files",
                dir
            )));
        }
        Ok(frames)
    }

    fn cycle(&self, count: usize) -> Vec<EncodedFrame> {
        (0..count)
            .map(|i| self.source[ping_pong_index(i, self.source.len())].clone())
            .collect()
    }
}

#[async_trait]
impl Renderer for SampleRenderer {
    async fn render(&self, audio: Option<&AudioClip>, _text: &str) -> Result<Vec<EncodedFrame>> {
        let duration = audio
            .map(|a| a.duration_seconds())
            .unwrap_or(DEFAULT_RENDER_SECONDS);
        let count = ((duration * self.fps as f64).round() as usize).max(1);
        Ok(self.cycle(count))
    }

    async fn idle_frames(&self, count: usize) -> Result<Vec<EncodedFrame>> {
        Ok(self.cycle(count.max(1)))
    }

    fn name(&self) -> &str {
        "sample"
    }
}

/// External renderer service reached over HTTP.
pub struct HttpRenderer {
    client: reqwest::Client,
    api_base: String,
    fps: u32,
}

impl HttpRenderer {
    pub fn new(config: &VideoSynthesisConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .ok_or_else(|| Error::Config("http renderer requires api_base".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            fps: config.fps,
        })
    }

    async fn fetch_frames(&self, path: &str, body: serde_json::Value) -> Result<Vec<EncodedFrame>> {
        let url = format!("{}{}", self.api_base, path);
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            Error::stage(StageKind::VideoSynthesis, format!("request failed: {}", e))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::stage(
                StageKind::VideoSynthesis,
                format!("endpoint returned {}: {}", status, body),
            ));
        }
        let body: serde_json::Value = response.json().await.map_err(|e| {
            Error::stage(StageKind::VideoSynthesis, format!("invalid reply: {}", e))
        })?;
        let encoded = body["video_frames"].as_array().ok_or_else(|| {
            Error::stage(StageKind::VideoSynthesis, "reply carried no video_frames")
        })?;
        encoded
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| {
                        Error::stage(StageKind::VideoSynthesis, "non-string frame entry")
                    })
                    .and_then(EncodedFrame::from_base64)
            })
            .collect()
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, audio: Option<&AudioClip>, text: &str) -> Result<Vec<EncodedFrame>> {
        let audio_data = match audio {
            Some(clip) => Some(clip.to_base64_wav()?),
            None => None,
        };
        self.fetch_frames(
            "/render",
            json!({
                "audio_data": audio_data,
                "text": text,
                "fps": self.fps,
            }),
        )
        .await
    }

    async fn idle_frames(&self, count: usize) -> Result<Vec<EncodedFrame>> {
        self.fetch_frames("/idle_frames", json!({ "frame_count": count }))
            .await
    }

    fn name(&self) -> &str {
        "http"
    }
}

pub struct RenderingStage {
    renderer: Arc<dyn Renderer>,
    enabled: bool,
}

impl RenderingStage {
    pub fn new(renderer: Arc<dyn Renderer>, enabled: bool) -> Self {
        Self { renderer, enabled }
    }
}

#[async_trait]
impl Stage for RenderingStage {
    fn kind(&self) -> StageKind {
        StageKind::VideoSynthesis
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn process(&self, turn: &mut Turn, _ctx: &SessionContext) -> Result<StageFlow> {
        if !self.enabled {
            return Ok(StageFlow::Continue);
        }
        let text = turn
            .response_text
            .clone()
            .or_else(|| turn.transcript.clone())
            .unwrap_or_default();
        let frames = self
            .renderer
            .render(turn.response_audio.as_ref(), &text)
            .await?;
        // A delivered non-idle turn must never carry an empty frame sequence.
        if frames.is_empty() {
            return Err(Error::stage(
                StageKind::VideoSynthesis,
                "renderer returned no frames",
            ));
        }
        debug!(
            "rendered {} frames via '{}'",
            frames.len(),
            self.renderer.name()
        );
        turn.response_frames = Some(frames);
        Ok(StageFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_index_reverses_at_ends() {
        let indices: Vec<usize> = (0..8).map(|i| ping_pong_index(i, 4)).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 2, 1, 0, 1]);
    }

    #[test]
    fn test_ping_pong_single_frame() {
        assert_eq!(ping_pong_index(0, 1), 0);
        assert_eq!(ping_pong_index(17, 1), 0);
    }

    #[tokio::test]
    async fn test_sample_renderer_spans_audio_duration() {
        let renderer = SampleRenderer::with_frames(
            vec![EncodedFrame::new(vec![1u8]), EncodedFrame::new(vec![2u8])],
            25,
        )
        .unwrap();
        let audio = AudioClip::silence(2.0, 16000);
        let frames = renderer.render(Some(&audio), "").await.unwrap();
        assert_eq!(frames.len(), 50);
    }

    #[tokio::test]
    async fn test_sample_renderer_idle_frames() {
        let renderer = SampleRenderer::with_frames(vec![EncodedFrame::new(vec![1u8]); 3], 25)
            .unwrap();
        let frames = renderer.idle_frames(10).await.unwrap();
        assert_eq!(frames.len(), 10);
    }
}
