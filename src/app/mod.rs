// SPDX-License-Identifier: GPL-3.0-only

//! Application model
//!
//! Wires the capture session controller, the camera selection service and
//! the frame analysis stage together. Front ends (terminal viewer, headless
//! commands) drive the model; they never touch the session directly.
//!
//! # Main Types
//!
//! - `VisioModel`: user-level operations (start, rotate, angle, mode)
//! - `CameraService`: committed selection and serialized changes
//! - `FrameAnalyzer`: face detection on delivered frames

pub mod camera_service;
pub mod frame_processor;

pub use camera_service::{CameraSelection, CameraService};
pub use frame_processor::{AnalysisReport, FrameAnalyzer, FrameRegion};

use crate::backends::camera::types::{
    CameraFrame, FrameReceiver, LensCategory, MediaMode, Position,
};
use crate::backends::camera::CaptureSessionController;
use crate::config::FacePreference;
use crate::errors::CameraResult;
use frame_processor::face_detector::DetectorFactory;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct VisioModel {
    cameras: CameraService,
    analyzer: FrameAnalyzer,
    preference: FacePreference,
}

impl VisioModel {
    /// Build the model; the analysis thread starts right away but sees no
    /// frames until [`start_session`](Self::start_session) succeeds
    pub fn new(
        controller: CaptureSessionController,
        detector: DetectorFactory,
        preference: FacePreference,
    ) -> Self {
        Self {
            cameras: CameraService::new(controller),
            analyzer: FrameAnalyzer::spawn(detector, preference.clone()),
            preference,
        }
    }

    fn controller(&self) -> &CaptureSessionController {
        self.cameras.controller()
    }

    /// Authorize, open the default camera (video, back, wide) and start
    /// analysis
    ///
    /// Authorization is checked before any device is resolved.
    pub async fn start_session(&self) -> CameraResult<()> {
        let mode = self.cameras.selection().mode;
        self.controller().request_authorization(mode).await?;

        self.cameras
            .change_camera(MediaMode::Video, Position::Back, LensCategory::Wide)
            .await?;
        self.attach_analysis();
        info!(selection = %self.selection(), "Session started");
        Ok(())
    }

    /// Switch between the back and front cameras
    pub async fn rotate_camera(&self) -> CameraResult<()> {
        self.cameras.toggle_position().await?;
        self.attach_analysis();
        Ok(())
    }

    /// Switch between the wide and ultra-wide lens
    pub async fn change_camera_angle(&self) -> CameraResult<()> {
        self.cameras.toggle_angle().await?;
        self.attach_analysis();
        Ok(())
    }

    /// Switch between video and photo, keeping side and lens
    pub async fn switch_media_mode(&self) -> CameraResult<()> {
        self.cameras.toggle_mode().await?;
        self.attach_analysis();
        Ok(())
    }

    /// Point the analyzer at the new frame-delivery output
    ///
    /// Replacing the output ended the old subscription; in photo mode there
    /// is no frame-delivery output and the analyzer idles.
    fn attach_analysis(&self) {
        self.analyzer.attach(self.controller().subscribe_frames());
    }

    pub fn selection(&self) -> CameraSelection {
        self.cameras.selection()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<CameraSelection> {
        self.cameras.subscribe_selection()
    }

    pub fn has_ultra_wide(&self) -> bool {
        self.cameras.has_ultra_wide()
    }

    pub fn face_number(&self) -> watch::Receiver<usize> {
        self.analyzer.face_number()
    }

    pub fn face_frames(&self) -> watch::Receiver<Vec<FrameRegion>> {
        self.analyzer.face_frames()
    }

    pub fn reports(&self) -> watch::Receiver<Option<AnalysisReport>> {
        self.analyzer.reports()
    }

    /// Frames of whatever output is attached, for the preview
    pub fn subscribe_preview(&self) -> Option<FrameReceiver> {
        self.controller().subscribe_preview()
    }

    /// Latest still in photo mode
    pub fn capture_still(&self) -> CameraResult<Arc<CameraFrame>> {
        self.controller().capture_still()
    }

    pub fn preference(&self) -> &FacePreference {
        &self.preference
    }

    /// Stop streaming; the model can be started again
    pub fn stop(&self) {
        self.analyzer.attach(None);
        self.controller().stop();
    }
}
