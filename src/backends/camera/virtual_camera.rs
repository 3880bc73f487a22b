// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera backend
//!
//! Provides a configurable rig of fake camera modules that stream generated
//! test-pattern frames. Used for demos on machines without the right
//! hardware and for exercising session and selection logic in tests.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::session::DeviceInput;
use super::types::*;
use super::{ActiveStream, CameraBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// One fake camera module
#[derive(Debug, Clone)]
pub struct VirtualCamera {
    device: CameraDevice,
    outputs: Vec<OutputKind>,
    refuse_open: bool,
    width: u32,
    height: u32,
    fps: u32,
}

impl VirtualCamera {
    /// A 320x240 @ 30fps module supporting both outputs
    pub fn new(name: &str, position: Position, kind: DeviceKind) -> Self {
        let id = name.to_lowercase().replace(' ', "-");
        Self {
            device: CameraDevice {
                name: name.to_string(),
                path: format!("virtual:{}", id),
                position,
                kind,
                still_capture: true,
                device_info: None,
            },
            outputs: vec![OutputKind::VideoData, OutputKind::Photo],
            refuse_open: false,
            width: 320,
            height: 240,
            fps: 30,
        }
    }

    /// Restrict the outputs this module can feed
    pub fn with_outputs(mut self, outputs: &[OutputKind]) -> Self {
        self.outputs = outputs.to_vec();
        self.device.still_capture = outputs.contains(&OutputKind::Photo);
        self
    }

    /// Make input construction fail, as for a busy or unplugged device
    pub fn refusing_open(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(2);
        self.height = height.max(2);
        self
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }
}

/// Backend serving a fixed set of [`VirtualCamera`]s
#[derive(Debug, Clone)]
pub struct VirtualBackend {
    cameras: Vec<VirtualCamera>,
}

impl VirtualBackend {
    pub fn new(cameras: Vec<VirtualCamera>) -> Self {
        Self { cameras }
    }

    /// Rig shaped like a recent phone: dual-wide and ultra-wide on the
    /// back, a single wide module on the front
    pub fn phone() -> Self {
        Self::new(vec![
            VirtualCamera::new("Back Dual Wide Camera", Position::Back, DeviceKind::DualWide),
            VirtualCamera::new("Back Ultra Wide Camera", Position::Back, DeviceKind::UltraWide),
            VirtualCamera::new("Front Camera", Position::Front, DeviceKind::Wide),
        ])
    }

    fn camera(&self, device: &CameraDevice) -> Option<&VirtualCamera> {
        self.cameras.iter().find(|c| c.device.path == device.path)
    }
}

impl CameraBackend for VirtualBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.cameras.iter().map(|c| c.device.clone()).collect()
    }

    fn open_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        match self.camera(device) {
            Some(camera) if camera.refuse_open => Err(BackendError::DeviceUnavailable(format!(
                "{} is busy",
                device.name
            ))),
            Some(camera) => Ok(DeviceInput::new(camera.device.clone())),
            None => Err(BackendError::DeviceUnavailable(format!(
                "{} is not part of this rig",
                device.path
            ))),
        }
    }

    fn supports_output(&self, device: &CameraDevice, output: OutputKind) -> bool {
        self.camera(device)
            .is_some_and(|camera| camera.outputs.contains(&output))
    }

    fn start_stream(
        &self,
        device: &CameraDevice,
        output: OutputKind,
        sink: FrameSink,
    ) -> BackendResult<Box<dyn ActiveStream>> {
        let camera = self
            .camera(device)
            .ok_or_else(|| BackendError::DeviceUnavailable(device.path.clone()))?
            .clone();
        if !camera.outputs.contains(&output) {
            return Err(BackendError::StreamFailed(format!(
                "{} cannot feed a {}",
                device.name, output
            )));
        }

        let interval = Duration::from_secs(1) / camera.fps.max(1);
        let tint = tint_for(&camera.device);
        let mut sequence = 0u64;

        debug!(device = %camera.device, fps = camera.fps, "Starting virtual stream");
        let name = format!("virtual-{}", camera.device.path);
        let controller = CaptureLoopController::start(&name, move || {
            let started = Instant::now();
            let frame = test_pattern(camera.width, camera.height, sequence, tint);
            sink.send_replace(Some(Arc::new(frame)));
            sequence += 1;
            std::thread::sleep(interval.saturating_sub(started.elapsed()));
            LoopAction::Continue
        });

        Ok(Box::new(controller))
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Virtual
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Per-module colour so switching cameras is visible in the preview
fn tint_for(device: &CameraDevice) -> [u8; 3] {
    match (device.position, device.kind) {
        (Position::Back, DeviceKind::DualWide) => [255, 200, 120],
        (Position::Back, DeviceKind::Wide) => [255, 230, 160],
        (Position::Back, DeviceKind::UltraWide) => [140, 200, 255],
        (Position::Front, _) => [170, 255, 170],
    }
}

/// Diagonal gradient that scrolls with the sequence number
fn test_pattern(width: u32, height: u32, sequence: u64, tint: [u8; 3]) -> CameraFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    let shift = (sequence % 256) as u32;

    for y in 0..height {
        for x in 0..width {
            let level = ((x + y + shift) % 256) as u16;
            for channel in tint {
                data.push((level * channel as u16 / 255) as u8);
            }
            data.push(255);
        }
    }

    let mut frame = CameraFrame::packed(width, height, PixelFormat::RGBA, data);
    frame.sequence = sequence;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_rig_layout() {
        let devices = VirtualBackend::phone().enumerate_cameras();
        assert_eq!(devices.len(), 3);
        assert_eq!(
            devices.iter().filter(|d| d.position == Position::Back).count(),
            2
        );
    }

    #[test]
    fn test_refusing_camera_fails_open() {
        let camera = VirtualCamera::new("Busy", Position::Back, DeviceKind::Wide).refusing_open();
        let device = camera.device().clone();
        let backend = VirtualBackend::new(vec![camera]);
        assert!(matches!(
            backend.open_input(&device),
            Err(BackendError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_stream_delivers_frames() {
        let camera =
            VirtualCamera::new("Small", Position::Back, DeviceKind::Wide).with_resolution(64, 48);
        let device = camera.device().clone();
        let backend = VirtualBackend::new(vec![camera]);
        let sink = frame_channel();
        let rx = sink.subscribe();

        let stream = backend
            .start_stream(&device, OutputKind::VideoData, Arc::clone(&sink))
            .expect("virtual stream starts");

        let deadline = Instant::now() + Duration::from_secs(2);
        while rx.borrow().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        stream.stop();

        let frame = rx.borrow().clone().expect("at least one frame");
        assert_eq!(frame.format, PixelFormat::RGBA);
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(!frame.is_truncated());
    }

    #[test]
    fn test_pattern_size() {
        let frame = test_pattern(8, 4, 3, [255, 255, 255]);
        assert_eq!(frame.data.len(), 8 * 4 * 4);
        assert_eq!(frame.sequence, 3);
    }
}
