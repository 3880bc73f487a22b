// SPDX-License-Identifier: GPL-3.0-only

//! Error types for camera selection, session configuration and analysis

use crate::backends::camera::types::{BackendError, LensCategory, OutputKind, Position};
use thiserror::Error;

/// Result type alias using CameraError
pub type CameraResult<T> = Result<T, CameraError>;

/// Errors surfaced by device resolution, session reconfiguration and
/// authorization. These propagate to the UI layer unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// Requested lens/position combination does not exist on this hardware
    #[error("No {lens} camera found on the {position} side")]
    DeviceNotFound {
        lens: LensCategory,
        position: Position,
    },

    /// Session rejected the device input
    #[error("Cannot attach input for {device}: {reason}")]
    InputAttach { device: String, reason: String },

    /// Session rejected the output for the requested mode
    #[error("Cannot attach {output}")]
    OutputAttach { output: OutputKind },

    /// User or policy denied camera access
    #[error("Camera access denied")]
    AuthorizationDenied,

    /// Host returned a value outside its documented set
    #[error("Unexpected value from the platform: {0}")]
    UnexpectedPlatformValue(String),

    /// New configuration committed but the stream did not start
    #[error("Failed to start capture session: {0}")]
    SessionStart(BackendError),

    /// `capture_still` called without a photo output attached
    #[error("No photo output attached")]
    NoStillOutput,

    /// Photo output attached but no frame has arrived yet
    #[error("No frame available for capture")]
    NoFrameAvailable,

    /// A background task driving the operation died
    #[error("Camera task failed: {0}")]
    TaskFailed(String),
}

/// Per-frame vision failures. Never fatal: the analysis stage degrades to a
/// zero face count and keeps streaming.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    /// Detector could not be constructed (e.g. model file missing)
    #[error("Face detector unavailable: {0}")]
    Unavailable(String),

    /// Frame buffer is empty or smaller than its declared geometry
    #[error("Frame is empty or truncated")]
    EmptyFrame,

    /// Backend reported a failure for this frame
    #[error("Detection failed: {0}")]
    Backend(String),
}

/// Configuration file failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration directory available on this system")]
    NoConfigDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
