// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Camera backend type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackendType {
    /// V4L2 capture nodes (`/dev/video*`)
    #[default]
    V4l2,
    /// Synthetic in-process camera rig
    Virtual,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::V4l2 => write!(f, "V4L2"),
            CameraBackendType::Virtual => write!(f, "virtual"),
        }
    }
}

/// Physical side of the device a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Facing the user (selfie side)
    Front,
    /// Facing away from the user
    Back,
}

impl Position {
    /// The other side of the device
    pub fn opposite(self) -> Self {
        match self {
            Position::Front => Position::Back,
            Position::Back => Position::Front,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Front => write!(f, "front"),
            Position::Back => write!(f, "back"),
        }
    }
}

/// Kind of physical camera module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// Virtual device fusing a wide and an ultra-wide sensor
    DualWide,
    /// Standard wide-angle module
    Wide,
    /// Ultra-wide module
    UltraWide,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::DualWide => write!(f, "dual-wide"),
            DeviceKind::Wide => write!(f, "wide"),
            DeviceKind::UltraWide => write!(f, "ultra-wide"),
        }
    }
}

/// Lens group the user prefers when several modules share a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LensCategory {
    /// No lens; never resolves to a device
    None,
    #[default]
    Wide,
    UltraWide,
}

impl LensCategory {
    /// Acceptable device kinds, most specific first
    pub fn device_kinds(self) -> &'static [DeviceKind] {
        match self {
            LensCategory::None => &[],
            LensCategory::Wide => &[DeviceKind::DualWide, DeviceKind::Wide],
            LensCategory::UltraWide => &[DeviceKind::UltraWide],
        }
    }

    /// Wide and ultra-wide swap; `None` stays `None`
    pub fn toggled(self) -> Self {
        match self {
            LensCategory::None => LensCategory::None,
            LensCategory::Wide => LensCategory::UltraWide,
            LensCategory::UltraWide => LensCategory::Wide,
        }
    }
}

impl std::fmt::Display for LensCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensCategory::None => write!(f, "none"),
            LensCategory::Wide => write!(f, "wide"),
            LensCategory::UltraWide => write!(f, "ultra-wide"),
        }
    }
}

/// What the session is configured to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Continuous frame stream
    #[default]
    Video,
    /// Single-shot still capture
    Photo,
}

impl MediaMode {
    /// Output kind that must be attached for this mode
    pub fn output_kind(self) -> OutputKind {
        match self {
            MediaMode::Video => OutputKind::VideoData,
            MediaMode::Photo => OutputKind::Photo,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            MediaMode::Video => MediaMode::Photo,
            MediaMode::Photo => MediaMode::Video,
        }
    }
}

impl std::fmt::Display for MediaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaMode::Video => write!(f, "video"),
            MediaMode::Photo => write!(f, "photo"),
        }
    }
}

/// Output sink attached to a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Streaming frame delivery (feeds preview and analysis)
    VideoData,
    /// Still capture (latest frame is kept for `capture_still`)
    Photo,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::VideoData => write!(f, "video data output"),
            OutputKind::Photo => write!(f, "photo output"),
        }
    }
}

/// Device information from V4L2 capability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Name of the device (V4L2 card)
    pub card: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Bus the device hangs off (e.g. "usb-0000:00:14.0-6")
    pub bus_info: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
    /// Real device path (resolved symlinks)
    pub real_path: String,
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub name: String,
    /// Backend-specific identifier (device node path or virtual id)
    pub path: String,
    pub position: Position,
    pub kind: DeviceKind,
    /// True when the module can take stills, not only stream
    pub still_capture: bool,
    pub device_info: Option<DeviceInfo>,
}

impl CameraDevice {
    /// Whether this device can serve the given media mode
    pub fn captures(&self, mode: MediaMode) -> bool {
        match mode {
            MediaMode::Video => true,
            MediaMode::Photo => self.still_capture,
        }
    }
}

impl std::fmt::Display for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} {})", self.name, self.position, self.kind)
    }
}

/// Pixel format for camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    YUYV,
}

impl PixelFormat {
    /// Bytes per pixel in the packed row layout
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::RGBA => 4,
            Self::RGB24 => 3,
            Self::YUYV => 2,
            Self::Gray8 => 1,
        }
    }

    /// Parse a V4L2 FourCC code
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"YUYV" => Some(Self::YUYV),
            b"GREY" => Some(Self::Gray8),
            b"RGB3" => Some(Self::RGB24),
            b"AB24" | b"RGBA" => Some(Self::RGBA),
            _ => None,
        }
    }
}

/// A single frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    /// Pixel format of the data
    pub format: PixelFormat,
    /// Row stride (bytes per row, may include padding)
    pub stride: u32,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
    /// Monotonic sequence number from the producing stream
    pub sequence: u64,
}

impl CameraFrame {
    /// Build a tightly packed frame (stride = width * bytes per pixel)
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data),
            format,
            stride: width * format.bytes_per_pixel(),
            captured_at: Instant::now(),
            sequence: 0,
        }
    }

    /// Raw pixel bytes
    pub fn data_slice(&self) -> &[u8] {
        &self.data
    }

    /// True when the geometry is unusable: empty, rows shorter than a line of
    /// pixels, or a buffer that cannot hold `height` rows of `stride` bytes
    pub fn is_truncated(&self) -> bool {
        let row_bytes = self.width as usize * self.format.bytes_per_pixel() as usize;
        let needed = self.stride as usize * self.height as usize;
        self.width == 0
            || self.height == 0
            || (self.stride as usize) < row_bytes
            || self.data.len() < needed
    }
}

/// Latest-frame slot written by a capture stream
///
/// Only the newest frame is kept; a consumer that falls behind skips frames
/// instead of queueing them.
pub type FrameSink = Arc<watch::Sender<Option<Arc<CameraFrame>>>>;

/// Subscription to a frame sink
pub type FrameReceiver = watch::Receiver<Option<Arc<CameraFrame>>>;

/// Create a fresh, empty frame slot
pub fn frame_channel() -> FrameSink {
    let (sender, _receiver) = watch::channel(None);
    Arc::new(sender)
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Camera device could not be opened
    DeviceUnavailable(String),
    /// Session cannot be reconfigured while running
    SessionRunning,
    /// Session has no input/output pair to run
    NotConfigured,
    /// Streaming failed to start
    StreamFailed(String),
    /// General I/O error
    IoError(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            BackendError::SessionRunning => {
                write!(f, "Session must be stopped before it is reconfigured")
            }
            BackendError::NotConfigured => write!(f, "Session has no input and output attached"),
            BackendError::StreamFailed(msg) => write!(f, "Stream failed: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_category_has_no_devices() {
        assert!(LensCategory::None.device_kinds().is_empty());
    }

    #[test]
    fn test_wide_prefers_dual_wide() {
        assert_eq!(
            LensCategory::Wide.device_kinds(),
            &[DeviceKind::DualWide, DeviceKind::Wide]
        );
        assert_eq!(LensCategory::UltraWide.device_kinds(), &[DeviceKind::UltraWide]);
    }

    #[test]
    fn test_toggles() {
        assert_eq!(LensCategory::Wide.toggled(), LensCategory::UltraWide);
        assert_eq!(LensCategory::None.toggled(), LensCategory::None);
        assert_eq!(Position::Back.opposite(), Position::Front);
        assert_eq!(MediaMode::Photo.output_kind(), OutputKind::Photo);
    }

    #[test]
    fn test_truncated_frame() {
        let frame = CameraFrame::packed(4, 4, PixelFormat::Gray8, vec![0; 15]);
        assert!(frame.is_truncated());
        let frame = CameraFrame::packed(4, 4, PixelFormat::Gray8, vec![0; 16]);
        assert!(!frame.is_truncated());
    }

    #[test]
    fn test_short_stride_is_truncated() {
        let frame = CameraFrame::packed(4, 4, PixelFormat::RGBA, vec![0; 64]);
        assert!(!frame.is_truncated());
        let zero = CameraFrame {
            stride: 0,
            ..frame.clone()
        };
        assert!(zero.is_truncated());
        let short = CameraFrame { stride: 8, ..frame };
        assert!(short.is_truncated());
    }

    #[test]
    fn test_frame_sink_keeps_latest_only() {
        let sink = frame_channel();
        let mut rx = sink.subscribe();
        for seq in 0..3u64 {
            let mut frame = CameraFrame::packed(1, 1, PixelFormat::Gray8, vec![seq as u8]);
            frame.sequence = seq;
            sink.send_replace(Some(Arc::new(frame)));
        }
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.map(|f| f.sequence), Some(2));
    }
}
