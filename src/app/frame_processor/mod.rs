// SPDX-License-Identifier: GPL-3.0-only

//! Frame analysis
//!
//! Face detection on live frames, published as latest-value streams for
//! overlay consumers.

pub mod analyzer;
pub mod tasks;
pub mod types;

pub use analyzer::{AnalysisReport, FrameAnalyzer};
pub use tasks::face_detector;
pub use types::{DetectionResult, FrameRegion};
