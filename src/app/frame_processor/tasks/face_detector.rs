// SPDX-License-Identifier: GPL-3.0-only

//! Face rectangle detection task
//!
//! Implements detection with the SeetaFace frontal cascade from the rustface
//! crate. Frames are reduced to 8-bit luma and downscaled before detection;
//! boxes are scaled back and normalized to the original frame.

use crate::app::frame_processor::types::FrameRegion;
use crate::backends::camera::format_converters::{downscale_luma, frame_to_luma};
use crate::backends::camera::types::CameraFrame;
use crate::config::Config;
use crate::constants::detection;
use crate::errors::DetectionError;
use rustface::ImageData;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, trace, warn};

/// Vision boundary: one frame in, normalized face rectangles out
///
/// Detectors run on the analysis thread and need not be `Send`.
pub trait FaceDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<FrameRegion>, DetectionError>;
}

/// Builds the detector on the analysis thread
pub type DetectorFactory = Box<dyn FnOnce() -> Box<dyn FaceDetector> + Send>;

/// SeetaFace detector
pub struct RustfaceDetector {
    detector: Box<dyn rustface::Detector>,
    min_face_size: u32,
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl RustfaceDetector {
    /// Load the model file
    pub fn load(
        model: &Path,
        min_face_size: u32,
        max_dimension: u32,
    ) -> Result<Self, DetectionError> {
        let model_path = model
            .to_str()
            .ok_or_else(|| DetectionError::Unavailable(format!("invalid model path {:?}", model)))?;
        let mut detector = rustface::create_detector(model_path)
            .map_err(|e| DetectionError::Unavailable(format!("{}: {}", model.display(), e)))?;

        let min_face_size = min_face_size.max(detection::MIN_FACE_SIZE_FLOOR);
        detector.set_min_face_size(min_face_size);
        detector.set_score_thresh(detection::SCORE_THRESHOLD);
        detector.set_pyramid_scale_factor(detection::PYRAMID_SCALE_FACTOR);
        detector.set_slide_window_step(
            detection::SLIDE_WINDOW_STEP,
            detection::SLIDE_WINDOW_STEP,
        );

        debug!(model = %model.display(), min_face_size, max_dimension, "Loaded face detector");
        Ok(Self {
            detector,
            min_face_size,
            max_dimension: max_dimension.max(min_face_size),
        })
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<FrameRegion>, DetectionError> {
        let start = std::time::Instant::now();
        let luma = frame_to_luma(frame)?;

        let (width, height) = (frame.width, frame.height);
        let (proc, proc_width, proc_height, scale) =
            if width > self.max_dimension || height > self.max_dimension {
                let scale = (width as f32 / self.max_dimension as f32)
                    .max(height as f32 / self.max_dimension as f32);
                let new_width = ((width as f32 / scale) as u32).max(1);
                let new_height = ((height as f32 / scale) as u32).max(1);
                (
                    downscale_luma(&luma, width, height, new_width, new_height),
                    new_width,
                    new_height,
                    scale,
                )
            } else {
                (luma, width, height, 1.0)
            };

        // The cascade cannot look at anything smaller than one window
        if proc_width < self.min_face_size || proc_height < self.min_face_size {
            return Ok(Vec::new());
        }

        let image = ImageData::new(&proc, proc_width, proc_height);
        let detector = &mut self.detector;
        let faces = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&image)))
            .map_err(|_| DetectionError::Backend("detector panicked on this frame".to_string()))?;

        let regions: Vec<FrameRegion> = faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FrameRegion::from_pixels(
                    (bbox.x() as f32 * scale) as i32,
                    (bbox.y() as f32 * scale) as i32,
                    (bbox.width() as f32 * scale) as u32,
                    (bbox.height() as f32 * scale) as u32,
                    width,
                    height,
                )
            })
            .collect();

        trace!(
            proc_width,
            proc_height,
            faces = regions.len(),
            detection_ms = start.elapsed().as_millis(),
            "Face detection complete"
        );
        Ok(regions)
    }
}

/// Stand-in used when the model could not be loaded
///
/// Fails every frame, so the analysis stage keeps publishing a zero count.
pub struct UnavailableDetector {
    reason: String,
}

impl UnavailableDetector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl FaceDetector for UnavailableDetector {
    fn detect(&mut self, _frame: &CameraFrame) -> Result<Vec<FrameRegion>, DetectionError> {
        Err(DetectionError::Unavailable(self.reason.clone()))
    }
}

/// Detector described by the configuration, degraded if the model is missing
pub fn detector_from_config(config: &Config) -> Box<dyn FaceDetector> {
    let Some(model) = config.detector_model_path() else {
        warn!("No data directory for the face model, face detection disabled");
        return Box::new(UnavailableDetector::new("no model path"));
    };

    match RustfaceDetector::load(&model, config.min_face_size, config.max_detection_dimension) {
        Ok(detector) => Box::new(detector),
        Err(e) => {
            warn!(error = %e, "Face detection disabled");
            Box::new(UnavailableDetector::new(e.to_string()))
        }
    }
}

/// Factory that builds the configured detector on the analysis thread
pub fn factory_from_config(config: &Config) -> DetectorFactory {
    let config = config.clone();
    Box::new(move || detector_from_config(&config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;

    #[test]
    fn test_missing_model_degrades() {
        let config = Config {
            detector_model: Some("/nonexistent/model.bin".into()),
            ..Config::default()
        };
        let mut detector = detector_from_config(&config);
        let frame = CameraFrame::packed(2, 2, PixelFormat::Gray8, vec![0; 4]);
        assert!(matches!(
            detector.detect(&frame),
            Err(DetectionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_missing_model_fails_load() {
        let result = RustfaceDetector::load(Path::new("/nonexistent/model.bin"), 20, 640);
        assert!(matches!(result, Err(DetectionError::Unavailable(_))));
    }
}
