// SPDX-License-Identifier: GPL-3.0-only

//! Frame analysis tasks

pub mod face_detector;

pub use face_detector::{FaceDetector, RustfaceDetector, UnavailableDetector};
