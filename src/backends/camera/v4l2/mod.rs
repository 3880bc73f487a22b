// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera backend
//!
//! Streams from `/dev/video*` capture nodes through memory-mapped buffers.
//! The device and its stream live on a dedicated capture thread; frames are
//! converted to RGBA there and published to the output's frame slot.

pub mod enumeration;

use super::format_converters::{decode_mjpeg, yuyv_to_rgba};
use super::session::DeviceInput;
use super::types::*;
use super::{ActiveStream, CameraBackend, v4l2_utils};
use crate::config::DeviceOverride;
use crate::constants::{timing, v4l2 as defaults};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// V4L2 backend
pub struct V4l2Backend {
    overrides: HashMap<String, DeviceOverride>,
}

impl V4l2Backend {
    pub fn new(overrides: HashMap<String, DeviceOverride>) -> Self {
        Self { overrides }
    }
}

impl CameraBackend for V4l2Backend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        enumeration::enumerate_devices(&self.overrides)
    }

    fn open_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        let node = v4l2_utils::query_capabilities(&device.path).ok_or_else(|| {
            BackendError::DeviceUnavailable(format!("{} cannot be opened", device.path))
        })?;
        if !node.is_video_capture() {
            return Err(BackendError::DeviceUnavailable(format!(
                "{} is not a capture node",
                device.path
            )));
        }
        Ok(DeviceInput::new(device.clone()))
    }

    fn supports_output(&self, device: &CameraDevice, output: OutputKind) -> bool {
        match output {
            OutputKind::VideoData => true,
            OutputKind::Photo => device.still_capture,
        }
    }

    fn start_stream(
        &self,
        device: &CameraDevice,
        output: OutputKind,
        sink: FrameSink,
    ) -> BackendResult<Box<dyn ActiveStream>> {
        V4l2Stream::start(device, output, sink).map(|s| Box::new(s) as Box<dyn ActiveStream>)
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::V4l2
    }

    fn is_available(&self) -> bool {
        !v4l2_utils::video_nodes().is_empty()
    }
}

/// Running capture thread for one node
struct V4l2Stream {
    stop_signal: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
}

impl V4l2Stream {
    /// Spawn the capture thread and wait until the node is streaming
    fn start(device: &CameraDevice, output: OutputKind, sink: FrameSink) -> BackendResult<Self> {
        let path = device.path.clone();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        info!(device = %device, %output, "Starting V4L2 capture");

        let capture_thread = thread::Builder::new()
            .name(format!("v4l2-{}", path.trim_start_matches("/dev/")))
            .spawn(move || {
                if let Err(e) = capture_loop(&path, thread_stop, sink, ready_tx) {
                    error!(path, error = %e, "V4L2 capture loop error");
                }
            })?;

        let mut stream = Self {
            stop_signal,
            capture_thread: Some(capture_thread),
        };

        match ready_rx.recv_timeout(timing::STREAM_START_TIMEOUT) {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(e)) => {
                stream.shutdown();
                Err(BackendError::StreamFailed(e))
            }
            Err(_) => {
                stream.shutdown();
                Err(BackendError::StreamFailed(format!(
                    "{} did not start streaming",
                    device.path
                )))
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take()
            && handle.join().is_err()
        {
            warn!("V4L2 capture thread panicked");
        }
    }
}

impl ActiveStream for V4l2Stream {
    fn stop(mut self: Box<Self>) {
        self.shutdown();
    }

    fn is_running(&self) -> bool {
        self.capture_thread
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Negotiate the first preferred format the driver accepts
fn negotiate_format(dev: &Device) -> Result<Format, String> {
    for fourcc in defaults::PREFERRED_FOURCCS {
        let wanted = FourCC::new(fourcc);
        let format = Format::new(defaults::CAPTURE_WIDTH, defaults::CAPTURE_HEIGHT, wanted);
        match dev.set_format(&format) {
            Ok(actual) if actual.fourcc == wanted => return Ok(actual),
            Ok(actual) => {
                debug!(requested = ?wanted, got = ?actual.fourcc, "Driver substituted format");
            }
            Err(e) => debug!(fourcc = ?wanted, error = %e, "Format rejected"),
        }
    }
    Err("no supported pixel format (YUYV or MJPG)".to_string())
}

/// Capture loop running on the capture thread
///
/// Reports startup success or failure once through `ready`, then streams
/// until `stop_signal` is set.
fn capture_loop(
    path: &str,
    stop_signal: Arc<AtomicBool>,
    sink: FrameSink,
    ready: SyncSender<Result<(), String>>,
) -> Result<(), String> {
    let setup = || -> Result<(Device, Format), String> {
        let dev = Device::with_path(path).map_err(|e| format!("Failed to open device: {}", e))?;
        let format = negotiate_format(&dev)?;
        Ok((dev, format))
    };

    let (dev, format) = match setup() {
        Ok(ok) => ok,
        Err(e) => {
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
    };

    let mut stream = match Stream::with_buffers(&dev, Type::VideoCapture, defaults::BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(e) => {
            let e = format!("Failed to create stream: {}", e);
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
    };
    stream.set_timeout(timing::CAPTURE_POLL_TIMEOUT);

    let width = format.width;
    let height = format.height;
    let is_mjpeg = format.fourcc == FourCC::new(b"MJPG");
    info!(path, width, height, fourcc = ?format.fourcc, "V4L2 format configured");

    let _ = ready.send(Ok(()));

    let mut sequence = 0u64;
    let started = Instant::now();

    while !stop_signal.load(Ordering::SeqCst) {
        let (buf, meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(format!("Failed to capture frame: {}", e)),
        };
        let used = (meta.bytesused as usize).min(buf.len());
        let buf = &buf[..used];

        let frame = if is_mjpeg {
            match decode_mjpeg(buf) {
                Ok((rgba, w, h)) => CameraFrame::packed(w, h, PixelFormat::RGBA, rgba),
                Err(e) => {
                    trace!(error = %e, "Dropping undecodable MJPEG frame");
                    continue;
                }
            }
        } else {
            let rgba = yuyv_to_rgba(buf, width, height, format.stride);
            CameraFrame::packed(width, height, PixelFormat::RGBA, rgba)
        };

        let frame = CameraFrame { sequence, ..frame };
        sink.send_replace(Some(Arc::new(frame)));
        sequence += 1;

        if sequence % timing::FRAME_LOG_INTERVAL == 0 {
            let fps = sequence as f64 / started.elapsed().as_secs_f64().max(f64::EPSILON);
            debug!(path, frames = sequence, fps = format!("{:.1}", fps), "V4L2 capture stats");
        }
    }

    info!(path, "V4L2 capture loop stopped");
    Ok(())
}
