// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for camera selection and session wiring

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use visio::app::frame_processor::face_detector::{DetectorFactory, FaceDetector};
use visio::app::{CameraSelection, CameraService, FrameRegion, VisioModel};
use visio::backends::camera::session::DeviceInput;
use visio::backends::camera::types::*;
use visio::backends::camera::virtual_camera::{VirtualBackend, VirtualCamera};
use visio::backends::camera::{ActiveStream, CameraBackend, CaptureSessionController};
use visio::backends::permission::{AuthorizationStatus, StaticPermission};
use visio::config::FacePreference;
use visio::{CameraError, DetectionError};

/// Virtual rig that counts how often devices were enumerated
struct CountingBackend {
    inner: VirtualBackend,
    enumerations: AtomicUsize,
}

impl CountingBackend {
    fn new(inner: VirtualBackend) -> Self {
        Self {
            inner,
            enumerations: AtomicUsize::new(0),
        }
    }
}

impl CameraBackend for CountingBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        self.inner.enumerate_cameras()
    }

    fn open_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        self.inner.open_input(device)
    }

    fn supports_output(&self, device: &CameraDevice, output: OutputKind) -> bool {
        self.inner.supports_output(device, output)
    }

    fn start_stream(
        &self,
        device: &CameraDevice,
        output: OutputKind,
        sink: FrameSink,
    ) -> BackendResult<Box<dyn ActiveStream>> {
        self.inner.start_stream(device, output, sink)
    }

    fn backend_type(&self) -> CameraBackendType {
        self.inner.backend_type()
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Virtual rig whose front cameras open but never start streaming
struct FrontStartFails(VirtualBackend);

impl CameraBackend for FrontStartFails {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.0.enumerate_cameras()
    }

    fn open_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        self.0.open_input(device)
    }

    fn supports_output(&self, device: &CameraDevice, output: OutputKind) -> bool {
        self.0.supports_output(device, output)
    }

    fn start_stream(
        &self,
        device: &CameraDevice,
        output: OutputKind,
        sink: FrameSink,
    ) -> BackendResult<Box<dyn ActiveStream>> {
        if device.position == Position::Front {
            return Err(BackendError::StreamFailed(format!("{} stalled", device.name)));
        }
        self.0.start_stream(device, output, sink)
    }

    fn backend_type(&self) -> CameraBackendType {
        self.0.backend_type()
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Finds two faces in every frame
struct TwoFaces;

impl FaceDetector for TwoFaces {
    fn detect(&mut self, _frame: &CameraFrame) -> Result<Vec<FrameRegion>, DetectionError> {
        let face = FrameRegion {
            x: 0.25,
            y: 0.25,
            width: 0.2,
            height: 0.2,
        };
        Ok(vec![face, face])
    }
}

fn two_faces() -> DetectorFactory {
    Box::new(|| Box::new(TwoFaces) as Box<dyn FaceDetector>)
}

fn wide_only_rig() -> VirtualBackend {
    VirtualBackend::new(vec![
        VirtualCamera::new("Back Camera", Position::Back, DeviceKind::Wide),
        VirtualCamera::new("Front Camera", Position::Front, DeviceKind::Wide),
    ])
}

fn controller(backend: impl CameraBackend + 'static) -> CaptureSessionController {
    CaptureSessionController::new(Arc::new(backend), Arc::new(StaticPermission::granted()))
}

fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl Fn(&T) -> bool) -> T {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let value = rx.borrow_and_update().clone();
        if pred(&value) || Instant::now() > deadline {
            return value;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[tokio::test]
async fn test_denied_authorization_touches_no_device() {
    let backend = Arc::new(CountingBackend::new(VirtualBackend::phone()));
    let permission = Arc::new(StaticPermission::new(AuthorizationStatus::Denied, true));
    let controller = CaptureSessionController::new(
        Arc::clone(&backend) as Arc<dyn CameraBackend>,
        permission.clone(),
    );
    let model = VisioModel::new(controller, two_faces(), FacePreference::new(true));

    let result = model.start_session().await;

    assert!(matches!(result, Err(CameraError::AuthorizationDenied)));
    assert_eq!(backend.enumerations.load(Ordering::SeqCst), 0);
    assert_eq!(permission.prompts(), 0);
    assert_eq!(model.selection(), CameraSelection::default());
}

#[tokio::test]
async fn test_refused_prompt_is_denied() {
    let permission = Arc::new(StaticPermission::new(AuthorizationStatus::NotDetermined, false));
    let controller =
        CaptureSessionController::new(Arc::new(VirtualBackend::phone()), permission.clone());
    let model = VisioModel::new(controller, two_faces(), FacePreference::new(true));

    let result = model.start_session().await;

    assert!(matches!(result, Err(CameraError::AuthorizationDenied)));
    assert_eq!(permission.prompts(), 1);
}

#[tokio::test]
async fn test_missing_ultra_wide_keeps_wide_session() {
    let controller = controller(wide_only_rig());
    let model = VisioModel::new(controller.clone(), two_faces(), FacePreference::new(true));
    model.start_session().await.expect("wide back camera");
    assert!(!model.has_ultra_wide());

    let result = model.change_camera_angle().await;

    assert!(matches!(
        result,
        Err(CameraError::DeviceNotFound {
            lens: LensCategory::UltraWide,
            position: Position::Back
        })
    ));
    assert_eq!(model.selection(), CameraSelection::default());
    assert!(controller.is_running());
    let (inputs, outputs) = controller.configuration().describe();
    assert_eq!(inputs, vec!["virtual:back-camera".to_string()]);
    assert_eq!(outputs, vec![OutputKind::VideoData]);
    model.stop();
}

#[tokio::test]
async fn test_rotate_resets_lens_to_wide() {
    let model = VisioModel::new(
        controller(VirtualBackend::phone()),
        two_faces(),
        FacePreference::new(true),
    );
    model.start_session().await.expect("back camera");
    model.change_camera_angle().await.expect("ultra-wide");
    assert_eq!(model.selection().lens, LensCategory::UltraWide);

    model.rotate_camera().await.expect("front camera");

    let selection = model.selection();
    assert_eq!(selection.position, Position::Front);
    assert_eq!(selection.lens, LensCategory::Wide);
    assert_eq!(selection.mode, MediaMode::Video);
    model.stop();
}

#[tokio::test]
async fn test_failed_reconfigure_leaves_configuration_unchanged() {
    let rig = VirtualBackend::new(vec![
        VirtualCamera::new("Back Camera", Position::Back, DeviceKind::Wide),
        VirtualCamera::new("Front Camera", Position::Front, DeviceKind::Wide).refusing_open(),
    ]);
    let controller = controller(rig);
    let service = CameraService::new(controller.clone());
    service
        .change_camera(MediaMode::Video, Position::Back, LensCategory::Wide)
        .await
        .expect("back camera");
    let before = controller.configuration().describe();

    let result = service.change_position(Position::Front).await;

    assert!(matches!(result, Err(CameraError::InputAttach { .. })));
    assert_eq!(controller.configuration().describe(), before);
    assert_eq!(service.selection().position, Position::Back);
    assert!(controller.is_running());
    controller.stop();
}

#[tokio::test]
async fn test_failed_start_restores_running_session() {
    let controller = controller(FrontStartFails(wide_only_rig()));
    let model = VisioModel::new(controller.clone(), two_faces(), FacePreference::new(true));
    model.start_session().await.expect("back camera");
    let before = controller.configuration().describe();

    let result = model.rotate_camera().await;

    assert!(matches!(
        result,
        Err(CameraError::SessionStart(BackendError::StreamFailed(_)))
    ));
    assert_eq!(controller.configuration().describe(), before);
    assert!(controller.is_running());
    assert_eq!(model.selection(), CameraSelection::default());
    model.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_rotations_both_apply() {
    let model = VisioModel::new(
        controller(VirtualBackend::phone()),
        two_faces(),
        FacePreference::new(true),
    );
    model.start_session().await.expect("back camera");

    let (first, second) = tokio::join!(model.rotate_camera(), model.rotate_camera());

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(model.selection().position, Position::Back);
    model.stop();
}

#[tokio::test]
async fn test_ultra_wide_check_does_not_enumerate() {
    let backend = Arc::new(CountingBackend::new(VirtualBackend::phone()));
    let controller = CaptureSessionController::new(
        Arc::clone(&backend) as Arc<dyn CameraBackend>,
        Arc::new(StaticPermission::granted()),
    );
    let model = VisioModel::new(controller, two_faces(), FacePreference::new(true));
    model.start_session().await.expect("back camera");
    let enumerated = backend.enumerations.load(Ordering::SeqCst);

    for _ in 0..10 {
        assert!(model.has_ultra_wide());
    }

    assert_eq!(backend.enumerations.load(Ordering::SeqCst), enumerated);
    model.stop();
}

#[tokio::test]
async fn test_committed_selection_is_last_success() {
    let controller = controller(wide_only_rig());
    let service = CameraService::new(controller.clone());
    let mut published = service.subscribe_selection();

    service
        .change_camera(MediaMode::Photo, Position::Front, LensCategory::Wide)
        .await
        .expect("front photo");
    let _ = service.change_angle(LensCategory::UltraWide).await;
    let _ = service.change_angle(LensCategory::None).await;

    let expected = CameraSelection {
        mode: MediaMode::Photo,
        position: Position::Front,
        lens: LensCategory::Wide,
    };
    assert_eq!(service.selection(), expected);
    assert_eq!(*published.borrow_and_update(), expected);
    controller.stop();
}

#[tokio::test]
async fn test_photo_mode_detaches_analysis() {
    let model = VisioModel::new(
        controller(VirtualBackend::phone()),
        two_faces(),
        FacePreference::new(true),
    );
    model.start_session().await.expect("back camera");
    let mut faces = model.face_number();
    assert_eq!(wait_for(&mut faces, |n| *n == 2), 2);

    model.switch_media_mode().await.expect("photo mode");

    assert_eq!(model.selection().mode, MediaMode::Photo);
    assert_eq!(*model.face_number().borrow(), 0);
    let mut preview = model.subscribe_preview().expect("photo output preview");
    let frame = wait_for(&mut preview, |f| f.is_some());
    assert!(frame.is_some());
    assert!(model.capture_still().is_ok());
    model.stop();
}

#[tokio::test]
async fn test_preference_off_keeps_true_count() {
    let preference = FacePreference::new(false);
    let model = VisioModel::new(
        controller(VirtualBackend::phone()),
        two_faces(),
        preference.clone(),
    );
    model.start_session().await.expect("back camera");

    let mut reports = model.reports();
    let report = wait_for(&mut reports, |r| r.is_some()).expect("a report");
    assert_eq!(report.face_count, 2);
    assert!(report.boxes.is_empty());
    assert!(model.face_frames().borrow().is_empty());

    preference.set_show_rectangles(true);
    let mut boxes = model.face_frames();
    assert_eq!(wait_for(&mut boxes, |b| b.len() == 2).len(), 2);
    model.stop();
}

#[tokio::test]
async fn test_video_mode_without_capture_support_is_not_found() {
    let rig = VirtualBackend::new(vec![
        VirtualCamera::new("Back Camera", Position::Back, DeviceKind::Wide)
            .with_outputs(&[OutputKind::Photo]),
    ]);
    let model = VisioModel::new(controller(rig), two_faces(), FacePreference::new(true));

    let result = model.start_session().await;

    assert!(result.is_err());
    assert_eq!(model.selection(), CameraSelection::default());
}
