//! Staged processing pipeline
//!
//! Routes a turn through the stage chain for its input kind. Stage errors
//! are captured on the turn so partial results always reach the output
//! queue; the voice-activity "no speech" verdict is the only early exit.

use crate::stage::{SessionContext, Stage, StageFlow};
use mowa_core::{Error, InputKind, Result, StageKind, Turn, TurnError};
use std::collections::HashSet;
use tracing::{debug, warn};

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Build a pipeline. At most one stage per kind is allowed.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.kind()) {
                return Err(Error::Config(format!(
                    "duplicate {} stage in pipeline",
                    stage.kind()
                )));
            }
        }
        Ok(Self { stages })
    }

    /// The ordered stage list for one input kind. Text turns bypass
    /// voice activity and speech recognition entirely.
    pub fn route(&self, kind: InputKind) -> Vec<&dyn Stage> {
        self.stages
            .iter()
            .filter(|stage| match kind {
                InputKind::Audio => true,
                InputKind::Text => !matches!(
                    stage.kind(),
                    StageKind::VoiceActivity | StageKind::SpeechToText
                ),
            })
            .map(|stage| stage.as_ref())
            .collect()
    }

    /// Drive one turn through its route and seal it.
    pub async fn run(&self, turn: &mut Turn, ctx: &SessionContext) {
        for stage in self.route(turn.input_kind()) {
            match stage.process(turn, ctx).await {
                Ok(StageFlow::Continue) => {}
                Ok(StageFlow::NoSpeech) => {
                    debug!("turn {}: no speech detected, skipping", turn.turn_id);
                    turn.skipped = true;
                    break;
                }
                Err(err) => {
                    warn!("turn {}: {}", turn.turn_id, err);
                    turn.error = Some(match err {
                        Error::Stage { kind, message } => TurnError {
                            stage: kind,
                            message,
                        },
                        other => TurnError {
                            stage: stage.kind(),
                            message: other.to_string(),
                        },
                    });
                    break;
                }
            }
        }
        turn.complete();
    }
}
