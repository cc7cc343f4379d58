pub mod config;
pub mod error;
pub mod media;
pub mod protocol;
pub mod turn;

pub use error::{Error, Result};
pub use media::{AudioClip, EncodedFrame, FrameBatch};
pub use turn::{InputKind, SessionState, StageKind, Turn, TurnError, TurnInput};
