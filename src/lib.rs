// SPDX-License-Identifier: GPL-3.0-only

//! Visio - live camera preview with real-time face detection
//!
//! This library provides the capture session, camera selection and face
//! analysis stages behind the `visio` terminal viewer.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: Application model, camera selection and frame analysis
//! - [`backends`]: Camera backends, capture session and permission checks
//! - [`config`]: User configuration handling
//! - [`terminal`]: Half-block terminal preview
//!
//! # Example
//!
//! ```ignore
//! let controller = CaptureSessionController::new(backend, permission);
//! let model = VisioModel::new(controller, factory_from_config(&config), preference);
//! model.start_session().await?;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod terminal;

// Re-export commonly used types
pub use app::{AnalysisReport, CameraSelection, FrameRegion, VisioModel};
pub use config::{Config, ConfigStore, FacePreference};
pub use errors::{CameraError, CameraResult, DetectionError};
