use thiserror::Error;

/// All errors produced by vultus-core.
#[derive(Debug, Error)]
pub enum VultusError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("malformed server message: {0}")]
    MalformedMessage(String),

    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("unknown rig parameter: {name}")]
    UnknownParameter { name: String },

    #[error("session is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VultusError>;
