//! Error types for echomemo
//!
//! Uses thiserror for ergonomic error definitions. Component errors are
//! caught at the coordinator boundary and surfaced as a short status line;
//! only startup failures reach `main`.

use thiserror::Error;

/// Top-level error type for the echomemo application
#[derive(Error, Debug)]
pub enum EchoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    #[error("Memory store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the encoder and button input devices
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown input code: '{0}'. Use evtest to find valid key and axis names.")]
    UnknownCode(String),

    #[error("No input device exposes the configured encoder/button codes")]
    NoDevice,

    #[error("Input backend not supported on this platform: {0}")]
    NotSupported(String),

    #[error("evdev error: {0}")]
    Evdev(String),

    #[error("Input source already started; sources cannot be restarted")]
    AlreadyStarted,
}

/// Errors related to recording and playback
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Audio resource busy: {0}")]
    ResourceBusy(String),

    #[error("Invalid media state: {0}")]
    InvalidState(String),

    #[error("Audio device not found: '{0}'")]
    DeviceNotFound(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Audio encoding error: {0}")]
    Encode(String),

    #[error("Capture did not stop within {0} seconds")]
    Timeout(u32),
}

/// Errors related to the remote transcription/generation/synthesis services
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AiError {
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote server error: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors related to the persisted memory records
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored date '{0}'")]
    InvalidDate(String),
}

/// Error side of a completed background task, as seen by the coordinator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("{0}")]
    Media(#[from] MediaError),

    #[error("{0}")]
    Ai(#[from] AiError),

    #[error("Storage failed: {0}")]
    Store(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,
}

impl TaskError {
    /// Short text for the status line of a small display
    pub fn status_line(&self) -> String {
        match self {
            TaskError::Media(MediaError::ResourceBusy(_)) => "Audio busy".to_string(),
            TaskError::Media(MediaError::InvalidState(_)) => "Internal error".to_string(),
            TaskError::Media(_) => "Audio error".to_string(),
            TaskError::Ai(AiError::TranscriptionFailed(_)) => "Could not transcribe".to_string(),
            TaskError::Ai(AiError::SynthesisFailed(_)) => "No voice available".to_string(),
            TaskError::Ai(_) => "AI unavailable".to_string(),
            TaskError::Store(_) => "Save failed".to_string(),
            TaskError::Timeout(secs) => format!("Timeout ({}s)", secs),
            TaskError::Cancelled => "Cancelled".to_string(),
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        TaskError::Store(e.to_string())
    }
}

/// Result type alias using EchoError
pub type Result<T> = std::result::Result<T, EchoError>;

#[cfg(target_os = "linux")]
impl From<std::io::Error> for InputError {
    fn from(e: std::io::Error) -> Self {
        InputError::Evdev(e.to_string())
    }
}
