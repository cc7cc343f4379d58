//! Session manager
//!
//! Creates, looks up, expires and destroys sessions. The session table is
//! the only state shared across sessions; everything else lives inside the
//! sessions themselves.

use crate::pipeline::Pipeline;
use crate::registry;
use crate::session::Session;
use crate::stages::Renderer;
use mowa_core::config::{EngineConfig, SessionOverrides};
use mowa_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Builds the per-session pipeline and renderer. Swappable so tests can
/// inject mock engines.
pub type PipelineFactory =
    dyn Fn(&EngineConfig) -> Result<(Pipeline, Arc<dyn Renderer>)> + Send + Sync;

pub struct SessionManager {
    config: Arc<EngineConfig>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    factory: Box<PipelineFactory>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        Ok(Self {
            config: Arc::new(config),
            sessions: RwLock::new(HashMap::new()),
            factory: Box::new(registry::build_components),
            sweep_task: Mutex::new(None),
        })
    }

    /// Replace the stage registry with a custom factory.
    pub fn with_factory<F>(config: EngineConfig, factory: F) -> Result<Self>
    where
        F: Fn(&EngineConfig) -> Result<(Pipeline, Arc<dyn Renderer>)> + Send + Sync + 'static,
    {
        config.validate().map_err(Error::Config)?;
        Ok(Self {
            config: Arc::new(config),
            sessions: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
            sweep_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Create and start a new session.
    pub async fn create_session(&self, overrides: SessionOverrides) -> Result<Arc<Session>> {
        let max = self.config.limits.max_sessions;
        if self.sessions.read().len() >= max {
            return Err(Error::CapacityExceeded(max));
        }

        let (pipeline, renderer) = (self.factory)(&self.config)?;
        let session = Arc::new(Session::new(
            pipeline,
            renderer,
            Arc::clone(&self.config),
            overrides,
        ));
        session.start().await?;

        let at_capacity = {
            let mut sessions = self.sessions.write();
            if sessions.len() >= max {
                true
            } else {
                sessions.insert(session.id().to_string(), Arc::clone(&session));
                false
            }
        };
        if at_capacity {
            session.stop().await;
            return Err(Error::CapacityExceeded(max));
        }

        info!(
            "created session {} ({}/{} active)",
            session.id(),
            self.session_count(),
            max
        );
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Close and remove a session. Idempotent: a second call for the same id
    /// succeeds without a second teardown.
    pub async fn close_session(&self, id: &str) -> Result<()> {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(session) => {
                session.stop().await;
                info!("closed session {}", id);
            }
            None => {
                tracing::debug!("close_session({}): already gone", id);
            }
        }
        Ok(())
    }

    /// Close every session whose idle time exceeds the configured timeout.
    /// Returns how many were closed. Runs independently of client-initiated
    /// close so vanished clients cannot leak sessions.
    pub async fn sweep_expired(&self) -> usize {
        let timeout_millis = self.config.limits.session_timeout_secs * 1000;
        let expired: Vec<String> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|(_, session)| session.idle_millis() >= timeout_millis)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in &expired {
            warn!(
                "session {} idle past {}s timeout, closing",
                id, self.config.limits.session_timeout_secs
            );
            let _ = self.close_session(id).await;
        }
        expired.len()
    }

    /// Spawn the periodic expiry sweep.
    pub fn start_sweep(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(self.config.limits.sweep_interval_secs);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.sweep_expired().await;
            }
        });
        *self.sweep_task.lock() = Some(handle);
    }

    /// Stop the sweep and close every session.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweep_task.lock().take() {
            handle.abort();
        }
        let ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        for id in ids {
            let _ = self.close_session(&id).await;
        }
        info!("session manager shut down");
    }
}
