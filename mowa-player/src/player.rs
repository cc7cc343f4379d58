//! Synchronized playback state machine
//!
//! Video advance is locked to audio position: the speaking frame rate is
//! derived from `frames / audio_duration` and clamped to a sane band, never
//! assumed. Between turns a low-rate ping-pong idle loop keeps the avatar
//! breathing; transitions blend the first few frames at partial opacity so
//! the switch never pops.

use mowa_core::config::PlayerConfig;
use mowa_core::media::{EncodedFrame, FrameBatch};
use mowa_core::{Error, Result};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerMode {
    Idle,
    Speaking,
}

/// One frame as it should be composited: at `opacity < 1.0` the frame is
/// blended over `underlay` (the previously presented frame).
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub frame: EncodedFrame,
    pub opacity: f32,
    pub underlay: Option<EncodedFrame>,
}

/// Receives composited frames. Actual pixel presentation is outside this
/// crate's scope.
pub trait FrameSink: Send {
    fn present(&mut self, frame: RenderedFrame);
}

struct ActivePlayback {
    frames: Vec<EncodedFrame>,
    index: usize,
    fps: f64,
}

pub struct SyncPlayer {
    config: PlayerConfig,
    mode: PlayerMode,
    idle_frames: Vec<EncodedFrame>,
    idle_index: usize,
    direction: i32,
    active: Option<ActivePlayback>,
    blend_remaining: usize,
    last_frame: Option<EncodedFrame>,
}

impl SyncPlayer {
    /// `idle_frames` is the bootstrap cache fetched once per session.
    pub fn new(config: PlayerConfig, idle_frames: Vec<EncodedFrame>) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        if idle_frames.is_empty() {
            return Err(Error::Config("idle frame set is empty".to_string()));
        }
        Ok(Self {
            config,
            mode: PlayerMode::Idle,
            idle_frames,
            idle_index: 0,
            direction: 1,
            active: None,
            blend_remaining: 0,
            last_frame: None,
        })
    }

    pub fn mode(&self) -> PlayerMode {
        self.mode
    }

    pub fn frame_index(&self) -> usize {
        match self.mode {
            PlayerMode::Idle => self.idle_index,
            PlayerMode::Speaking => self.active.as_ref().map(|a| a.index).unwrap_or(0),
        }
    }

    pub fn idle_frame_count(&self) -> usize {
        self.idle_frames.len()
    }

    /// Tick rate of the current mode.
    pub fn current_fps(&self) -> f64 {
        match self.mode {
            PlayerMode::Idle => self.config.idle_tick_hz,
            PlayerMode::Speaking => self
                .active
                .as_ref()
                .map(|a| a.fps)
                .unwrap_or(self.config.fallback_fps),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.current_fps())
    }

    /// Switch to speaking playback for one reply.
    ///
    /// The frame rate is derived from the decoded audio duration and clamped
    /// to the configured band. A batch without audio (including one whose
    /// audio the caller failed to decode) plays at the fallback rate; video
    /// never blocks on audio.
    pub fn play(&mut self, batch: FrameBatch) -> Result<()> {
        if batch.frames.is_empty() {
            return Err(Error::Config("frame batch carries no frames".to_string()));
        }
        let fps = match batch.derived_fps(self.config.min_fps, self.config.max_fps) {
            Some(fps) => fps,
            None => {
                debug!(
                    "no usable audio, playing {} frames at fallback {} fps",
                    batch.frames.len(),
                    self.config.fallback_fps
                );
                self.config.fallback_fps
            }
        };
        self.active = Some(ActivePlayback {
            frames: batch.frames,
            index: 0,
            fps,
        });
        self.mode = PlayerMode::Speaking;
        self.blend_remaining = self.config.blend_frames;
        Ok(())
    }

    /// Advance one frame. Pure state step so schedulers and tests can drive
    /// it at whatever cadence they need.
    pub fn tick(&mut self) -> RenderedFrame {
        let frame = match self.mode {
            PlayerMode::Idle => self.tick_idle(),
            PlayerMode::Speaking => self.tick_speaking(),
        };
        let opacity = if self.blend_remaining > 0 {
            let total = self.config.blend_frames;
            let step = total - self.blend_remaining;
            self.blend_remaining -= 1;
            (step + 1) as f32 / (total + 1) as f32
        } else {
            1.0
        };
        let underlay = if opacity < 1.0 {
            self.last_frame.clone()
        } else {
            None
        };
        let rendered = RenderedFrame {
            frame: frame.clone(),
            opacity,
            underlay,
        };
        self.last_frame = Some(frame);
        rendered
    }

    fn tick_idle(&mut self) -> EncodedFrame {
        let frame = self.idle_frames[self.idle_index].clone();
        let len = self.idle_frames.len();
        if len > 1 {
            let next = self.idle_index as i64 + self.direction as i64;
            self.idle_index = next.clamp(0, (len - 1) as i64) as usize;
            if self.idle_index == len - 1 {
                self.direction = -1;
            } else if self.idle_index == 0 {
                self.direction = 1;
            }
        }
        frame
    }

    fn tick_speaking(&mut self) -> EncodedFrame {
        let Some(active) = self.active.as_mut() else {
            self.mode = PlayerMode::Idle;
            return self.tick_idle();
        };
        let index = active.index.min(active.frames.len() - 1);
        let frame = active.frames[index].clone();
        active.index += 1;
        if active.index >= active.frames.len() {
            self.enter_idle();
        }
        frame
    }

    fn enter_idle(&mut self) {
        self.active = None;
        self.mode = PlayerMode::Idle;
        // Resume from the middle of the idle sequence, not index 0, to avoid
        // a visible snap.
        self.idle_index = self.idle_frames.len() / 2;
        self.direction = 1;
        self.blend_remaining = self.config.blend_frames;
    }

    /// Timed-tick scheduler: sleep until the next frame instant, present,
    /// repeat. Incoming batches switch the player to speaking immediately.
    pub async fn run(
        &mut self,
        sink: &mut dyn FrameSink,
        mut batches: mpsc::Receiver<FrameBatch>,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut next_tick = tokio::time::Instant::now();
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                batch = batches.recv() => match batch {
                    Some(batch) => {
                        if let Err(e) = self.play(batch) {
                            warn!("dropped frame batch: {}", e);
                        }
                        next_tick = tokio::time::Instant::now();
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(next_tick) => {
                    sink.present(self.tick());
                    next_tick += self.tick_interval();
                    let now = tokio::time::Instant::now();
                    if next_tick < now {
                        next_tick = now;
                    }
                }
            }
        }
    }
}
