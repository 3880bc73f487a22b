// SPDX-License-Identifier: GPL-3.0-only

//! Camera selection state
//!
//! Holds the committed (mode, position, lens) selection and turns change
//! requests into session reconfigurations. Each change runs
//! read → resolve → reconfigure → commit under one async lock, so two
//! requests can never interleave, and the selection is only updated after
//! the session has been rewired successfully.

use crate::backends::camera::types::{LensCategory, MediaMode, Position};
use crate::backends::camera::CaptureSessionController;
use crate::errors::{CameraError, CameraResult};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

/// Committed camera selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraSelection {
    pub mode: MediaMode,
    pub position: Position,
    pub lens: LensCategory,
}

impl Default for CameraSelection {
    fn default() -> Self {
        Self {
            mode: MediaMode::Video,
            position: Position::Back,
            lens: LensCategory::Wide,
        }
    }
}

impl std::fmt::Display for CameraSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {} / {}", self.mode, self.position, self.lens)
    }
}

#[derive(Clone)]
pub struct CameraService {
    controller: CaptureSessionController,
    /// Held for the whole of every change
    state: Arc<Mutex<CameraSelection>>,
    published: Arc<watch::Sender<CameraSelection>>,
    /// Ultra-wide availability for the committed mode and position
    ultra_wide: Arc<AtomicBool>,
}

impl CameraService {
    pub fn new(controller: CaptureSessionController) -> Self {
        let initial = CameraSelection::default();
        Self {
            controller,
            state: Arc::new(Mutex::new(initial)),
            published: Arc::new(watch::channel(initial).0),
            ultra_wide: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn controller(&self) -> &CaptureSessionController {
        &self.controller
    }

    /// Last committed selection
    pub fn selection(&self) -> CameraSelection {
        *self.published.borrow()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<CameraSelection> {
        self.published.subscribe()
    }

    /// Whether the committed position has an ultra-wide module
    ///
    /// Looked up once per commit; false before the first one.
    pub fn has_ultra_wide(&self) -> bool {
        self.ultra_wide.load(Ordering::SeqCst)
    }

    /// Switch mode, position and lens together
    pub async fn change_camera(
        &self,
        mode: MediaMode,
        position: Position,
        lens: LensCategory,
    ) -> CameraResult<()> {
        self.change_with(|_| CameraSelection {
            mode,
            position,
            lens,
        })
        .await
    }

    /// Switch lens on the current side
    pub async fn change_angle(&self, lens: LensCategory) -> CameraResult<()> {
        self.change_with(|current| CameraSelection { lens, ..current })
            .await
    }

    /// Switch side; the lens always goes back to wide
    pub async fn change_position(&self, position: Position) -> CameraResult<()> {
        self.change_with(|current| CameraSelection {
            position,
            lens: LensCategory::Wide,
            ..current
        })
        .await
    }

    /// Switch to the other side, lens back to wide
    pub async fn toggle_position(&self) -> CameraResult<()> {
        self.change_with(|current| CameraSelection {
            position: current.position.opposite(),
            lens: LensCategory::Wide,
            ..current
        })
        .await
    }

    /// Switch between wide and ultra-wide on the current side
    pub async fn toggle_angle(&self) -> CameraResult<()> {
        self.change_with(|current| CameraSelection {
            lens: current.lens.toggled(),
            ..current
        })
        .await
    }

    /// Switch between video and photo, keeping side and lens
    pub async fn toggle_mode(&self) -> CameraResult<()> {
        self.change_with(|current| CameraSelection {
            mode: current.mode.toggled(),
            ..current
        })
        .await
    }

    /// Read, resolve, reconfigure and commit under the state lock
    ///
    /// `next` sees the committed selection as of the moment the lock is
    /// held, so queued changes build on each other.
    async fn change_with(
        &self,
        next: impl FnOnce(CameraSelection) -> CameraSelection,
    ) -> CameraResult<()> {
        let mut state = self.state.lock().await;
        let target = next(*state);
        let ultra_wide = self.apply(target).await?;
        self.commit(&mut state, target, ultra_wide);
        Ok(())
    }

    /// Resolve and reconfigure on the blocking pool
    ///
    /// Returns whether the target side has an ultra-wide module.
    async fn apply(&self, target: CameraSelection) -> CameraResult<bool> {
        debug!(%target, "Applying camera selection");
        let controller = self.controller.clone();

        tokio::task::spawn_blocking(move || -> CameraResult<bool> {
            let selector = controller.selector();
            let devices = selector.resolve(target.mode, target.position, target.lens)?;
            controller.reconfigure(&devices, target.mode)?;
            Ok(selector.has(target.mode, target.position, LensCategory::UltraWide))
        })
        .await
        .map_err(|e| CameraError::TaskFailed(e.to_string()))?
    }

    fn commit(&self, state: &mut CameraSelection, target: CameraSelection, ultra_wide: bool) {
        *state = target;
        self.ultra_wide.store(ultra_wide, Ordering::SeqCst);
        self.published.send_replace(target);
        info!(selection = %target, ultra_wide, "Camera selection committed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::virtual_camera::VirtualBackend;
    use crate::backends::permission::StaticPermission;

    fn service() -> CameraService {
        CameraService::new(CaptureSessionController::new(
            Arc::new(VirtualBackend::phone()),
            Arc::new(StaticPermission::granted()),
        ))
    }

    #[tokio::test]
    async fn test_change_angle_commits_lens() {
        let service = service();
        service
            .change_camera(MediaMode::Video, Position::Back, LensCategory::Wide)
            .await
            .expect("wide back camera");
        assert!(service.has_ultra_wide());

        service
            .change_angle(LensCategory::UltraWide)
            .await
            .expect("ultra-wide back camera");
        assert_eq!(service.selection().lens, LensCategory::UltraWide);
        service.controller().stop();
    }

    #[tokio::test]
    async fn test_none_lens_never_commits() {
        let service = service();
        let result = service.change_angle(LensCategory::None).await;
        assert!(matches!(result, Err(CameraError::DeviceNotFound { .. })));
        assert_eq!(service.selection(), CameraSelection::default());
    }

    #[tokio::test]
    async fn test_toggles_build_on_committed_state() {
        let service = service();
        service.toggle_position().await.expect("front camera");
        service.toggle_mode().await.expect("front photo");
        assert_eq!(
            service.selection(),
            CameraSelection {
                mode: MediaMode::Photo,
                position: Position::Front,
                lens: LensCategory::Wide,
            }
        );
        assert!(!service.has_ultra_wide());
        service.controller().stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_toggles_are_serialized() {
        let service = service();
        service
            .change_camera(MediaMode::Video, Position::Back, LensCategory::Wide)
            .await
            .expect("wide back camera");

        let (first, second) = tokio::join!(service.toggle_position(), service.toggle_position());

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(service.selection().position, Position::Back);
        service.controller().stop();
    }
}
