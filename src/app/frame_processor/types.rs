// SPDX-License-Identifier: GPL-3.0-only

//! Core types for frame analysis results

use serde::Serialize;

/// A rectangular region within a frame
///
/// Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions,
/// with the origin at the top-left corner. This allows easy transformation
/// to screen coordinates regardless of the actual frame size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl FrameRegion {
    /// Create a frame region from pixel coordinates
    ///
    /// The rectangle is clipped to the frame first, so detector boxes that
    /// hang over an edge still produce coordinates within [0, 1].
    pub fn from_pixels(
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let fw = frame_width.max(1) as f32;
        let fh = frame_height.max(1) as f32;

        let left = (x as f32).clamp(0.0, fw);
        let top = (y as f32).clamp(0.0, fh);
        let right = (x as f32 + width as f32).clamp(0.0, fw);
        let bottom = (y as f32 + height as f32).clamp(0.0, fh);

        Self {
            x: left / fw,
            y: top / fh,
            width: (right - left) / fw,
            height: (bottom - top) / fh,
        }
    }

    /// True when nothing of the rectangle lies inside the frame
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Output of one analyzed frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    pub face_count: usize,
    pub boxes: Vec<FrameRegion>,
}

impl DetectionResult {
    /// Every detected face counts; boxes clipped away entirely are not drawn
    pub fn new(mut boxes: Vec<FrameRegion>) -> Self {
        let face_count = boxes.len();
        boxes.retain(|region| !region.is_empty());
        Self { face_count, boxes }
    }
}
