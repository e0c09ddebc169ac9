//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while setting up the host audio output.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The selected host has no default output device
    #[error("no default output device on host {0}")]
    NoDefaultDevice(String),

    /// Failed to query or match a device configuration
    #[error("failed to get a usable device config: {0}")]
    ConfigError(String),

    /// The device offers no f32 output format
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Failed to build the output stream
    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the output stream
    #[error("failed to start audio stream: {0}")]
    StreamPlayError(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
