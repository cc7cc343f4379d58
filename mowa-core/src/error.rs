use crate::turn::StageKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("session is closing or closed")]
    SessionClosed,

    #[error("input queue full")]
    Backpressure,

    #[error("maximum concurrent sessions ({0}) reached")]
    CapacityExceeded(usize),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("{kind} stage failed: {message}")]
    Stage { kind: StageKind, message: String },

    #[error("transport decode error: {0}")]
    TransportDecode(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("audio error: {0}")]
    Audio(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable identifier surfaced to clients as `error_type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::SessionClosed => "session_closed",
            Error::Backpressure => "backpressure",
            Error::CapacityExceeded(_) => "capacity_exceeded",
            Error::SessionNotFound(_) => "session_not_found",
            Error::Stage { .. } => "stage_error",
            Error::TransportDecode(_) => "transport_decode_error",
            Error::Timeout(_) => "timeout",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Audio(_) => "audio_error",
        }
    }

    pub fn stage(kind: StageKind, message: impl Into<String>) -> Self {
        Error::Stage {
            kind,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
