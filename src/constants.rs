// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Application identifier, used for config, data and cache directories
pub const APP_NAME: &str = "visio";

/// Persisted preference keys
pub mod preferences {
    /// Whether face rectangles are drawn over the preview
    pub const SHOW_FACE_RECTANGLES: &str = "FaceRectangles";

    /// Configuration file inside the app config directory
    pub const CONFIG_FILE_NAME: &str = "config.json";
}

/// Face detection tuning
pub mod detection {
    /// SeetaFace frontal model shipped by the rustface project
    pub const DEFAULT_MODEL_FILE: &str = "seeta_fd_frontal_v1.0.bin";

    /// Smallest face (in processed pixels) the detector looks for
    pub const DEFAULT_MIN_FACE_SIZE: u32 = 20;

    /// Frames are downscaled so their longer side is at most this
    pub const DEFAULT_MAX_DIMENSION: u32 = 640;

    /// Lower bound of the model's minimum face size
    pub const MIN_FACE_SIZE_FLOOR: u32 = 20;

    pub const SCORE_THRESHOLD: f64 = 2.0;

    pub const PYRAMID_SCALE_FACTOR: f32 = 0.8;

    pub const SLIDE_WINDOW_STEP: u32 = 4;
}

/// V4L2 capture defaults
pub mod v4l2 {
    /// Requested capture size; drivers pick the nearest supported
    pub const CAPTURE_WIDTH: u32 = 640;
    pub const CAPTURE_HEIGHT: u32 = 480;

    /// Memory-mapped buffers queued on the capture node
    pub const BUFFER_COUNT: u32 = 4;

    /// Preferred pixel formats, in order
    pub const PREFERRED_FOURCCS: &[&[u8; 4]] = &[b"YUYV", b"MJPG"];
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// How long `start_stream` waits for a capture thread to report ready
    pub const STREAM_START_TIMEOUT: Duration = Duration::from_secs(5);

    /// Poll timeout for a V4L2 buffer, so stop requests are noticed
    pub const CAPTURE_POLL_TIMEOUT: Duration = Duration::from_millis(500);

    /// Analyzer sleep when there is no new frame
    pub const ANALYZER_IDLE: Duration = Duration::from_millis(5);

    /// Terminal viewer redraw and input poll interval
    pub const TERMINAL_TICK: Duration = Duration::from_millis(33);

    /// Log a frame statistics line every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 120;
}
