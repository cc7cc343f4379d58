//! Per-conversation session
//!
//! A session owns one pipeline, one bounded input queue and one output
//! queue, and processes turns strictly serially: no two turns for the same
//! session are ever mid-flight at once, so replies can never overtake each
//! other.

use crate::pipeline::Pipeline;
use crate::stage::{Exchange, SessionContext};
use crate::stages::Renderer;
use chrono::{DateTime, Utc};
use mowa_core::config::{EngineConfig, SessionLimits, SessionOverrides};
use mowa_core::media::EncodedFrame;
use mowa_core::{Error, Result, SessionState, Turn, TurnInput};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Read-only view of a session for the REST surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: u64,
    pub turns_completed: usize,
}

pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
    last_activity: AtomicU64,
    limits: SessionLimits,

    input_tx: mpsc::Sender<Turn>,
    input_rx: Mutex<Option<mpsc::Receiver<Turn>>>,
    output_tx: Mutex<Option<mpsc::UnboundedSender<Turn>>>,
    output_rx: Mutex<Option<mpsc::UnboundedReceiver<Turn>>>,

    pipeline: Pipeline,
    renderer: Arc<dyn Renderer>,
    ctx: Arc<SessionContext>,
    history: RwLock<Vec<Turn>>,

    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        pipeline: Pipeline,
        renderer: Arc<dyn Renderer>,
        config: Arc<EngineConfig>,
        overrides: SessionOverrides,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let limits = config.limits.clone();
        let (input_tx, input_rx) = mpsc::channel(limits.input_queue_depth);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let ctx = Arc::new(SessionContext::new(id.clone(), config, overrides));
        Self {
            id,
            created_at: Utc::now(),
            state: RwLock::new(SessionState::Created),
            last_activity: AtomicU64::new(now_millis()),
            limits,
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            output_tx: Mutex::new(Some(output_tx)),
            output_rx: Mutex::new(Some(output_rx)),
            pipeline,
            renderer,
            ctx,
            history: RwLock::new(Vec::new()),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Milliseconds since the last submit, completed turn or config update.
    pub fn idle_millis(&self) -> u64 {
        now_millis().saturating_sub(self.last_activity.load(Ordering::Relaxed))
    }

    pub fn touch(&self) {
        self.last_activity.store(now_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            state: self.state().as_str().to_string(),
            created_at: self.created_at,
            last_activity_at: self.last_activity.load(Ordering::Relaxed),
            turns_completed: self.history.read().len(),
        }
    }

    pub fn update_overrides(&self, overrides: &SessionOverrides) {
        self.ctx.overrides.write().merge(overrides);
        self.touch();
    }

    /// Idle frames from the session-owned cache, cycled up to `count`.
    pub fn idle_frames(&self, count: usize) -> Vec<EncodedFrame> {
        let cache = self.ctx.idle_frames.read();
        if cache.is_empty() {
            return Vec::new();
        }
        cache.iter().cycle().take(count).cloned().collect()
    }

    /// Queue one input and return the turn id it was assigned.
    pub fn submit(&self, input: TurnInput) -> Result<String> {
        if !self.state().accepts_input() {
            return Err(Error::SessionClosed);
        }
        let turn = Turn::new(input);
        let turn_id = turn.turn_id.clone();
        self.input_tx.try_send(turn).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Backpressure,
            mpsc::error::TrySendError::Closed(_) => Error::SessionClosed,
        })?;
        self.touch();
        Ok(turn_id)
    }

    /// Transition Created → Active, fetch the idle-frame cache and spawn the
    /// processing loop. Calling start on a running session is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Created => *state = SessionState::Active,
                SessionState::Active | SessionState::Processing | SessionState::Idle => {
                    return Ok(())
                }
                SessionState::Closing | SessionState::Closed => return Err(Error::SessionClosed),
            }
        }

        let idle_count = self.ctx.config.video_synthesis.idle_frame_count;
        match self.renderer.idle_frames(idle_count).await {
            Ok(frames) => {
                debug!("session {}: cached {} idle frames", self.id, frames.len());
                *self.ctx.idle_frames.write() = frames;
            }
            Err(e) => warn!("session {}: idle frame bootstrap failed: {}", self.id, e),
        }

        let input_rx = self
            .input_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Config("session loop already consumed its queue".to_string()))?;
        let output_tx = self
            .output_tx
            .lock()
            .take()
            .ok_or_else(|| Error::Config("session output already consumed".to_string()))?;

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            session.run_loop(input_rx, output_tx).await;
        });
        *self.task.lock() = Some(handle);
        info!("session {} started", self.id);
        Ok(())
    }

    async fn run_loop(
        self: Arc<Self>,
        mut input_rx: mpsc::Receiver<Turn>,
        output_tx: mpsc::UnboundedSender<Turn>,
    ) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let turn = match input_rx.try_recv() {
                Ok(turn) => turn,
                Err(mpsc::error::TryRecvError::Empty) => {
                    self.set_state_if_open(SessionState::Idle);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        received = input_rx.recv() => match received {
                            Some(turn) => turn,
                            None => break,
                        },
                    }
                }
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            };

            self.set_state_if_open(SessionState::Processing);
            let mut turn = turn;
            self.pipeline.run(&mut turn, &self.ctx).await;
            self.record_exchange(&turn);
            self.push_history(turn.clone());
            self.touch();
            if output_tx.send(turn).is_err() {
                debug!("session {}: output receiver dropped", self.id);
            }
            self.set_state_if_open(SessionState::Active);
        }
        *self.state.write() = SessionState::Closed;
        debug!("session {} loop exited", self.id);
    }

    fn set_state_if_open(&self, next: SessionState) {
        let mut state = self.state.write();
        if state.accepts_input() {
            *state = next;
        }
    }

    fn record_exchange(&self, turn: &Turn) {
        if turn.skipped || turn.error.is_some() {
            return;
        }
        let (Some(user), Some(assistant)) = (&turn.transcript, &turn.response_text) else {
            return;
        };
        let mut exchanges = self.ctx.exchanges.write();
        exchanges.push(Exchange {
            user: user.clone(),
            assistant: assistant.clone(),
        });
        let cap = self.limits.history_cap;
        if exchanges.len() > cap {
            let excess = exchanges.len() - cap;
            exchanges.drain(..excess);
        }
    }

    fn push_history(&self, turn: Turn) {
        let mut history = self.history.write();
        history.push(turn);
        let cap = self.limits.history_cap;
        if history.len() > cap {
            let excess = history.len() - cap;
            history.drain(..excess);
        }
    }

    /// History of completed turns, oldest first.
    pub fn history(&self) -> Vec<Turn> {
        self.history.read().clone()
    }

    /// Hand the output queue to the transport. Ownership of completed turns
    /// (and their media buffers) transfers with it.
    pub fn take_output(&self) -> Option<mpsc::UnboundedReceiver<Turn>> {
        self.output_rx.lock().take()
    }

    /// Return the output queue on transport detach so a reconnecting client
    /// can re-attach.
    pub fn restore_output(&self, rx: mpsc::UnboundedReceiver<Turn>) {
        *self.output_rx.lock() = Some(rx);
    }

    /// Drain in-flight work within the grace period, then force-cancel.
    /// Idempotent: later calls return immediately.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, SessionState::Closing | SessionState::Closed) {
                return;
            }
            *state = SessionState::Closing;
        }
        let _ = self.shutdown_tx.send(true);

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            let grace = Duration::from_millis(self.limits.stop_grace_ms);
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!(
                    "session {}: did not drain within {:?}, force-cancelling",
                    self.id, grace
                );
                abort.abort();
            }
        }
        *self.state.write() = SessionState::Closed;
        info!("session {} closed", self.id);
    }
}
