// SPDX-License-Identifier: GPL-3.0-only

//! The live capture session
//!
//! A session connects at most one camera input to at most one output. Inputs
//! and outputs can only be changed inside a [`ConfigurationTransaction`],
//! and a transaction can only be opened while the session is stopped.
//! Dropping a transaction without committing it puts the previous inputs
//! and outputs back.

use super::types::*;
use super::{ActiveStream, CameraBackend};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A camera device opened for capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInput {
    device: CameraDevice,
}

impl DeviceInput {
    /// Wrap a device that the backend managed to open
    pub fn new(device: CameraDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }
}

/// An output sink attached to the session
///
/// Every output owns its own frame slot. Replacing the output drops the
/// slot, which ends every subscription taken on it.
#[derive(Debug, Clone)]
pub struct CaptureOutput {
    kind: OutputKind,
    sink: FrameSink,
}

impl CaptureOutput {
    /// Create an output with a fresh frame slot
    pub fn new(kind: OutputKind) -> Self {
        Self {
            kind,
            sink: frame_channel(),
        }
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Subscribe to frames delivered to this output
    pub fn subscribe(&self) -> FrameReceiver {
        self.sink.subscribe()
    }

    /// Most recent frame delivered to this output
    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.sink.borrow().clone()
    }

    pub(crate) fn sink(&self) -> FrameSink {
        Arc::clone(&self.sink)
    }
}

/// Inputs and outputs attached at some point in time
#[derive(Debug, Clone, Default)]
pub struct SessionConfiguration {
    pub inputs: Vec<DeviceInput>,
    pub outputs: Vec<CaptureOutput>,
}

impl SessionConfiguration {
    /// Device paths and output kinds, for comparisons and logging
    pub fn describe(&self) -> (Vec<String>, Vec<OutputKind>) {
        (
            self.inputs.iter().map(|i| i.device.path.clone()).collect(),
            self.outputs.iter().map(|o| o.kind).collect(),
        )
    }
}

/// The single live capture session
pub struct CaptureSession {
    backend: Arc<dyn CameraBackend>,
    configuration: SessionConfiguration,
    stream: Option<Box<dyn ActiveStream>>,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            configuration: SessionConfiguration::default(),
            stream: None,
        }
    }

    pub fn backend(&self) -> &Arc<dyn CameraBackend> {
        &self.backend
    }

    pub fn inputs(&self) -> &[DeviceInput] {
        &self.configuration.inputs
    }

    pub fn outputs(&self) -> &[CaptureOutput] {
        &self.configuration.outputs
    }

    /// Snapshot of the attached inputs and outputs
    pub fn configuration(&self) -> SessionConfiguration {
        self.configuration.clone()
    }

    /// True while a stream is feeding the attached output
    pub fn is_running(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_running())
    }

    /// Start streaming from the attached input into the attached output
    pub fn start_running(&mut self) -> BackendResult<()> {
        if self.is_running() {
            return Ok(());
        }
        // A stream that exited on its own still holds its handle
        self.stop_running();

        let (Some(input), Some(output)) = (
            self.configuration.inputs.first(),
            self.configuration.outputs.first(),
        ) else {
            return Err(BackendError::NotConfigured);
        };

        let stream = self
            .backend
            .start_stream(&input.device, output.kind, output.sink())?;
        info!(device = %input.device, output = %output.kind, "Capture session running");
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop the stream if one is running
    pub fn stop_running(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Stopping capture session");
            stream.stop();
        }
    }

    /// Open a configuration transaction
    ///
    /// Fails with `SessionRunning` unless the session was stopped first.
    pub fn begin_configuration(&mut self) -> BackendResult<ConfigurationTransaction<'_>> {
        if self.is_running() {
            return Err(BackendError::SessionRunning);
        }
        let snapshot = self.configuration.clone();
        Ok(ConfigurationTransaction {
            session: self,
            snapshot: Some(snapshot),
        })
    }

    /// Put back a previously captured configuration
    ///
    /// Used for rollback; skips the admission checks because the
    /// configuration was accepted before.
    pub fn restore(&mut self, configuration: SessionConfiguration) -> BackendResult<()> {
        self.stop_running();
        let mut tx = self.begin_configuration()?;
        tx.session.configuration = configuration;
        tx.commit();
        Ok(())
    }

    /// Latest still from the attached photo output
    pub fn latest_still(&self) -> Option<Option<Arc<CameraFrame>>> {
        self.configuration
            .outputs
            .iter()
            .find(|o| o.kind == OutputKind::Photo)
            .map(|o| o.latest_frame())
    }

    /// Subscribe to the attached video data output
    pub fn subscribe_frames(&self) -> Option<FrameReceiver> {
        self.configuration
            .outputs
            .iter()
            .find(|o| o.kind == OutputKind::VideoData)
            .map(|o| o.subscribe())
    }

    /// Subscribe to whatever output is attached (preview)
    pub fn subscribe_preview(&self) -> Option<FrameReceiver> {
        self.configuration.outputs.first().map(|o| o.subscribe())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop_running();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (inputs, outputs) = self.configuration.describe();
        f.debug_struct("CaptureSession")
            .field("backend", &self.backend.backend_type())
            .field("inputs", &inputs)
            .field("outputs", &outputs)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Begin/commit bracket around session changes
pub struct ConfigurationTransaction<'a> {
    session: &'a mut CaptureSession,
    /// Configuration to restore if the transaction is dropped; `None` once committed
    snapshot: Option<SessionConfiguration>,
}

impl ConfigurationTransaction<'_> {
    pub fn remove_all_inputs(&mut self) {
        self.session.configuration.inputs.clear();
    }

    pub fn remove_all_outputs(&mut self) {
        self.session.configuration.outputs.clear();
    }

    /// The session takes exactly one camera input, and only a device that
    /// can feed every output already attached.
    pub fn can_add_input(&self, input: &DeviceInput) -> bool {
        let config = &self.session.configuration;
        config.inputs.is_empty()
            && config
                .outputs
                .iter()
                .all(|o| self.session.backend.supports_output(&input.device, o.kind))
    }

    pub fn add_input(&mut self, input: DeviceInput) {
        debug!(device = %input.device, "Adding session input");
        self.session.configuration.inputs.push(input);
    }

    /// The session takes exactly one output, and only one the attached
    /// input can feed.
    pub fn can_add_output(&self, output: &CaptureOutput) -> bool {
        let config = &self.session.configuration;
        config.outputs.is_empty()
            && config
                .inputs
                .iter()
                .all(|i| self.session.backend.supports_output(&i.device, output.kind))
    }

    pub fn add_output(&mut self, output: CaptureOutput) {
        debug!(output = %output.kind, "Adding session output");
        self.session.configuration.outputs.push(output);
    }

    /// Make the changes permanent
    pub fn commit(mut self) {
        self.snapshot = None;
        let (inputs, outputs) = self.session.configuration.describe();
        debug!(?inputs, ?outputs, "Session configuration committed");
    }
}

impl Drop for ConfigurationTransaction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            warn!("Configuration transaction abandoned, rolling back");
            self.session.configuration = snapshot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::virtual_camera::{VirtualBackend, VirtualCamera};

    fn session() -> CaptureSession {
        CaptureSession::new(Arc::new(VirtualBackend::phone()))
    }

    fn first_device(session: &CaptureSession) -> CameraDevice {
        session.backend().enumerate_cameras().remove(0)
    }

    #[test]
    fn test_single_input_rule() {
        let mut session = session();
        let device = first_device(&session);
        let mut tx = session.begin_configuration().expect("stopped session");
        let input = DeviceInput::new(device.clone());
        assert!(tx.can_add_input(&input));
        tx.add_input(input.clone());
        assert!(!tx.can_add_input(&input));
        tx.commit();
        assert_eq!(session.inputs().len(), 1);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut session = session();
        let device = first_device(&session);
        {
            let mut tx = session.begin_configuration().expect("stopped session");
            tx.add_input(DeviceInput::new(device.clone()));
            tx.add_output(CaptureOutput::new(OutputKind::VideoData));
            tx.commit();
        }
        {
            let mut tx = session.begin_configuration().expect("stopped session");
            tx.remove_all_inputs();
            tx.remove_all_outputs();
        }
        assert_eq!(session.inputs()[0].device(), &device);
        assert_eq!(session.outputs()[0].kind(), OutputKind::VideoData);
    }

    #[test]
    fn test_cannot_configure_while_running() {
        let mut session = session();
        let device = first_device(&session);
        let mut tx = session.begin_configuration().expect("stopped session");
        tx.add_input(DeviceInput::new(device));
        tx.add_output(CaptureOutput::new(OutputKind::VideoData));
        tx.commit();

        session.start_running().expect("virtual stream starts");
        assert!(session.is_running());
        assert!(matches!(
            session.begin_configuration(),
            Err(BackendError::SessionRunning)
        ));
        session.stop_running();
        assert!(!session.is_running());
    }

    #[test]
    fn test_start_without_configuration_fails() {
        let mut session = session();
        assert_eq!(session.start_running(), Err(BackendError::NotConfigured));
    }

    #[test]
    fn test_output_rejected_for_incompatible_device() {
        let camera = VirtualCamera::new("still-less", Position::Back, DeviceKind::Wide)
            .with_outputs(&[OutputKind::VideoData]);
        let backend = Arc::new(VirtualBackend::new(vec![camera]));
        let mut session = CaptureSession::new(backend);
        let device = first_device(&session);

        let mut tx = session.begin_configuration().expect("stopped session");
        tx.add_input(DeviceInput::new(device));
        assert!(!tx.can_add_output(&CaptureOutput::new(OutputKind::Photo)));
        assert!(tx.can_add_output(&CaptureOutput::new(OutputKind::VideoData)));
    }
}
