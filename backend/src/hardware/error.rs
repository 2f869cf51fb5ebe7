//! Error types for hardware collaborators.

use std::io;

/// Result type for hardware operations
pub type HardwareResult<T> = Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Camera is already exposing")]
    CameraBusy,

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
