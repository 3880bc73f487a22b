// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ CameraService (app)      │  ← selection state, serialized changes
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐     ┌────────────────┐
//! │ CaptureSessionController │ ──▶ │ DeviceSelector │
//! └────────────┬─────────────┘     └────────────────┘
//!              │ transactional reconfigure
//!              ▼
//! ┌──────────────────────────┐
//! │ CaptureSession           │  ← inputs, outputs, running stream
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │  CameraBackend trait     │
//! └────────────┬─────────────┘
//!        ┌─────┴──────┐
//!        ▼            ▼
//!    ┌──────┐    ┌─────────┐
//!    │ V4L2 │    │ Virtual │
//!    └──────┘    └─────────┘
//! ```

pub mod controller;
pub mod format_converters;
pub mod frame_loop;
pub mod selector;
pub mod session;
pub mod types;
pub mod v4l2;
pub mod v4l2_utils;
pub mod virtual_camera;

pub use controller::CaptureSessionController;
pub use selector::DeviceSelector;
pub use session::{CaptureOutput, CaptureSession, ConfigurationTransaction, DeviceInput};
pub use types::*;

use crate::config::Config;
use std::sync::Arc;

/// Hardware boundary of the capture pipeline
///
/// Backends enumerate physical modules, construct inputs for them and run
/// the stream that feeds an attached output. Session bookkeeping (which
/// input and output are attached, transactions, rollback) lives in
/// [`CaptureSession`], not in the backend.
pub trait CameraBackend: Send + Sync {
    // ===== Enumeration =====

    /// Enumerate available cameras on this backend
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    // ===== Session plumbing =====

    /// Construct a device input for `device`
    ///
    /// Fails when the device cannot be opened (busy, unplugged, no access).
    fn open_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput>;

    /// Whether the device can feed the given output kind
    fn supports_output(&self, device: &CameraDevice, output: OutputKind) -> bool;

    /// Start streaming frames from `device` into `sink`
    ///
    /// The returned stream keeps running until it is stopped or dropped.
    fn start_stream(
        &self,
        device: &CameraDevice,
        output: OutputKind,
        sink: FrameSink,
    ) -> BackendResult<Box<dyn ActiveStream>>;

    // ===== Metadata =====

    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;

    /// Check if this backend is available on the current system
    fn is_available(&self) -> bool;
}

/// A running capture stream
pub trait ActiveStream: Send {
    /// Stop the stream and wait for its producer to exit
    fn stop(self: Box<Self>);

    /// False once the producer has exited on its own (device lost, error)
    fn is_running(&self) -> bool;
}

/// Create the backend selected in the configuration
pub fn get_backend_for_type(
    backend_type: CameraBackendType,
    config: &Config,
) -> Arc<dyn CameraBackend> {
    match backend_type {
        CameraBackendType::V4l2 => {
            Arc::new(v4l2::V4l2Backend::new(config.device_overrides.clone()))
        }
        CameraBackendType::Virtual => Arc::new(virtual_camera::VirtualBackend::phone()),
    }
}
