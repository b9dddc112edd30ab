//! Engine Error Types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a track path into a sample buffer
///
/// A failed load never disturbs the deck that requested it: the previous
/// buffer keeps playing.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Track has no audio frames: {path}")]
    Empty { path: PathBuf },
}

impl LoadError {
    /// Path of the track that failed to load
    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::Open { path, .. }
            | LoadError::Unsupported { path, .. }
            | LoadError::Decode { path, .. }
            | LoadError::Empty { path } => path,
        }
    }
}

/// Errors that can occur in the audio engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No audio devices found")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine already running")]
    AlreadyRunning,

    #[error("Engine not running")]
    NotRunning,

    #[error("No deck on the {0} side")]
    NoDeck(crate::message::Side),

    #[error("Track load error: {0}")]
    LoadError(#[from] LoadError),

    #[error("DSP error: {0}")]
    DspError(#[from] airdeck_dsp::DspError),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,

    #[error("Channel receive error - sender dropped")]
    ChannelRecvError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
