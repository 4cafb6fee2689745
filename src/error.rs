//! Error types for the duplex engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine to its caller.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Chirp synthesis parameters violate their invariants.
    #[error("Invalid chirp parameters: {0}")]
    InvalidParameters(String),

    /// Microphone capture is not authorized; nothing was started.
    #[error("Audio capture permission not granted")]
    PermissionDenied,

    /// The playback loop failed to open, start or write to its output session.
    #[error("Playback I/O error: {0}")]
    PlaybackIo(#[source] DeviceError),

    /// The capture loop failed to open or read its input session, or to write the file.
    #[error("Capture I/O error: {0}")]
    CaptureIo(#[source] DeviceError),

    /// The output file could not be created.
    #[error("Cannot write to {}: {source}", path.display())]
    PathUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An engine thread panicked before returning.
    #[error("{0} task panicked")]
    TaskPanicked(&'static str),

    /// An engine thread could not be spawned.
    #[error("Failed to spawn engine task: {0}")]
    TaskSpawn(#[source] std::io::Error),
}

impl EngineError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters(msg.into())
    }
}

/// Errors raised by audio devices and the sample file.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No device of the requested direction (or name) exists.
    #[error("No {0} device available")]
    NotFound(String),

    /// The device cannot run with the requested configuration.
    #[error("Unsupported configuration: {0}")]
    Config(String),

    /// The backend failed to build, start, pause or drive a stream.
    #[error("Stream error: {0}")]
    Stream(String),

    /// File I/O failure while persisting samples.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Self::Stream(msg.into())
    }
}
