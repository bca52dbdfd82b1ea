//! Error types for streamscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio path errors
    #[error("Malformed audio chunk: {message}")]
    MalformedAudio { message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio device unavailable: {message}")]
    DeviceUnavailable { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transcription backend errors
    #[error("Transcription model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Transcription backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("Transcription backend busy: dispatch queue full")]
    BackendBusy,

    // Session errors
    #[error("Session is closed")]
    SessionClosed,

    // Server errors
    #[error("WebSocket error: {message}")]
    Transport { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ScribeError {
    /// Whether this error ends the session it occurred in.
    ///
    /// Per-chunk and per-dispatch failures are reported to the client and
    /// the session keeps running; only a closed session (or the transport
    /// dropping) is terminal.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, ScribeError::SessionClosed | ScribeError::Transport { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScribeError>;
