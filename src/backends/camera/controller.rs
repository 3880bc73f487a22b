// SPDX-License-Identifier: GPL-3.0-only

//! Capture session controller
//!
//! Owns the single capture session and the permission boundary. All
//! rewiring goes through [`CaptureSessionController::reconfigure`], which is
//! all-or-nothing: on failure the session keeps the inputs and outputs it
//! had before the call, and keeps streaming if it was streaming.

use super::session::{CaptureOutput, CaptureSession, SessionConfiguration};
use super::types::*;
use super::{CameraBackend, DeviceSelector};
use crate::backends::permission::{AuthorizationStatus, PermissionBackend};
use crate::errors::{CameraError, CameraResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Thread-safe handle to the capture session
#[derive(Clone)]
pub struct CaptureSessionController {
    session: Arc<Mutex<CaptureSession>>,
    permission: Arc<dyn PermissionBackend>,
    selector: DeviceSelector,
}

impl CaptureSessionController {
    pub fn new(backend: Arc<dyn CameraBackend>, permission: Arc<dyn PermissionBackend>) -> Self {
        info!(backend = %backend.backend_type(), "Creating capture session controller");
        Self {
            session: Arc::new(Mutex::new(CaptureSession::new(Arc::clone(&backend)))),
            permission,
            selector: DeviceSelector::new(backend),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, CaptureSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn selector(&self) -> &DeviceSelector {
        &self.selector
    }

    pub fn backend_type(&self) -> CameraBackendType {
        self.lock_session().backend().backend_type()
    }

    pub fn permission(&self) -> &Arc<dyn PermissionBackend> {
        &self.permission
    }

    /// Rewire the session to stream from `devices` into an output for `mode`
    ///
    /// Devices are tried in order and the first one the session admits
    /// becomes the input. A device that fails to open or is rejected does
    /// not abort the change; the next one is tried instead. Only when no
    /// device attaches does this return [`CameraError::InputAttach`], naming
    /// the last failure, with the previous configuration restored.
    ///
    /// Blocks on hardware I/O while the old stream stops and the new one
    /// starts.
    pub fn reconfigure(&self, devices: &[CameraDevice], mode: MediaMode) -> CameraResult<()> {
        let Some(first) = devices.first() else {
            return Err(CameraError::InputAttach {
                device: "none".to_string(),
                reason: "no devices to attach".to_string(),
            });
        };

        let mut session = self.lock_session();
        let was_running = session.is_running();
        let previous = session.configuration();

        info!(device = %first, %mode, was_running, "Reconfiguring capture session");
        session.stop_running();

        if let Err(e) = attach(&mut session, devices, mode) {
            // The uncommitted transaction has already rolled back
            warn!(error = %e, "Reconfiguration rejected, keeping previous session");
            resume(&mut session, was_running);
            return Err(e);
        }

        if let Err(e) = session.start_running() {
            warn!(error = %e, "New configuration failed to start, rolling back");
            if let Err(restore_err) = session.restore(previous) {
                warn!(error = %restore_err, "Failed to restore previous configuration");
            }
            resume(&mut session, was_running);
            return Err(CameraError::SessionStart(e));
        }

        Ok(())
    }

    /// Check camera access, prompting only when the user was never asked
    pub async fn request_authorization(&self, mode: MediaMode) -> CameraResult<()> {
        match self.permission.authorization_status(mode)? {
            AuthorizationStatus::Authorized => Ok(()),
            AuthorizationStatus::NotDetermined => {
                debug!(%mode, "Authorization not determined, prompting");
                if self.permission.request_access(mode).await? {
                    info!(%mode, "Camera access granted");
                    Ok(())
                } else {
                    Err(CameraError::AuthorizationDenied)
                }
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                Err(CameraError::AuthorizationDenied)
            }
        }
    }

    /// Latest frame from the attached photo output
    pub fn capture_still(&self) -> CameraResult<Arc<CameraFrame>> {
        match self.lock_session().latest_still() {
            None => Err(CameraError::NoStillOutput),
            Some(None) => Err(CameraError::NoFrameAvailable),
            Some(Some(frame)) => Ok(frame),
        }
    }

    /// Subscribe to the video data output, if one is attached
    pub fn subscribe_frames(&self) -> Option<FrameReceiver> {
        self.lock_session().subscribe_frames()
    }

    /// Subscribe to whatever output is attached
    pub fn subscribe_preview(&self) -> Option<FrameReceiver> {
        self.lock_session().subscribe_preview()
    }

    pub fn is_running(&self) -> bool {
        self.lock_session().is_running()
    }

    /// Current inputs and outputs
    pub fn configuration(&self) -> SessionConfiguration {
        self.lock_session().configuration()
    }

    pub fn stop(&self) {
        self.lock_session().stop_running();
    }
}

/// Replace inputs and outputs inside one transaction
fn attach(
    session: &mut CaptureSession,
    devices: &[CameraDevice],
    mode: MediaMode,
) -> CameraResult<()> {
    let backend = Arc::clone(session.backend());
    let mut tx = session
        .begin_configuration()
        .map_err(CameraError::SessionStart)?;

    tx.remove_all_inputs();
    tx.remove_all_outputs();

    let mut last_failure = None;
    let mut attached = false;
    for device in devices {
        let input = match backend.open_input(device) {
            Ok(input) => input,
            Err(e) => {
                debug!(%device, error = %e, "Device input could not be opened");
                last_failure = Some((device.name.clone(), e.to_string()));
                continue;
            }
        };
        if !tx.can_add_input(&input) {
            last_failure = Some((device.name.clone(), "rejected by the session".to_string()));
            continue;
        }
        tx.add_input(input);
        attached = true;
        break;
    }

    if !attached {
        let (device, reason) = last_failure
            .unwrap_or_else(|| ("none".to_string(), "no devices to attach".to_string()));
        return Err(CameraError::InputAttach { device, reason });
    }

    let output = CaptureOutput::new(mode.output_kind());
    if !tx.can_add_output(&output) {
        return Err(CameraError::OutputAttach {
            output: output.kind(),
        });
    }
    tx.add_output(output);

    tx.commit();
    Ok(())
}

/// Restart a session that was streaming before a failed change
fn resume(session: &mut CaptureSession, was_running: bool) {
    if !was_running {
        return;
    }
    if let Err(e) = session.start_running() {
        warn!(error = %e, "Failed to resume previous session");
    }
}
