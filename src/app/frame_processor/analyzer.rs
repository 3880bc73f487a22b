// SPDX-License-Identifier: GPL-3.0-only

//! Frame analysis stage
//!
//! Pulls the newest frame from the current frame-delivery subscription,
//! runs face detection on it and publishes the face count and boxes.
//! Frames that arrive while a detection is running are overwritten, never
//! queued. The subscription is replaced after every session reconfigure.

use super::tasks::face_detector::{DetectorFactory, FaceDetector};
use super::types::{DetectionResult, FrameRegion};
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::backends::camera::types::{CameraFrame, FrameReceiver};
use crate::config::FacePreference;
use crate::constants::timing;
use crate::errors::DetectionError;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// One published analysis outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Sequence number of the analyzed frame
    pub sequence: u64,
    pub face_count: usize,
    /// Boxes as published (empty when the preference is off)
    pub boxes: Vec<FrameRegion>,
    /// Detection failure for this frame, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What to publish for one detection outcome
///
/// On failure the count drops to zero and no boxes are published. When
/// the preference is off the boxes are replaced by an empty list while the
/// count stays true.
pub fn publication(
    result: &Result<Vec<FrameRegion>, DetectionError>,
    show_rectangles: bool,
) -> (usize, Option<Vec<FrameRegion>>) {
    match result {
        Err(_) => (0, None),
        Ok(boxes) => {
            let detection = DetectionResult::new(boxes.clone());
            let published = if show_rectangles {
                detection.boxes
            } else {
                Vec::new()
            };
            (detection.face_count, Some(published))
        }
    }
}

struct Outputs {
    face_number: watch::Sender<usize>,
    face_frames: watch::Sender<Vec<FrameRegion>>,
    reports: watch::Sender<Option<AnalysisReport>>,
}

impl Outputs {
    fn publish(
        &self,
        frame: &CameraFrame,
        result: Result<Vec<FrameRegion>, DetectionError>,
        show: bool,
    ) {
        let (count, boxes) = publication(&result, show);

        self.face_number.send_replace(count);
        if let Some(boxes) = &boxes {
            self.face_frames.send_replace(boxes.clone());
        }
        self.reports.send_replace(Some(AnalysisReport {
            sequence: frame.sequence,
            face_count: count,
            boxes: boxes.unwrap_or_default(),
            error: result.err().map(|e| e.to_string()),
        }));
    }

    fn reset(&self) {
        self.face_number.send_replace(0);
        self.face_frames.send_replace(Vec::new());
    }
}

/// Detection failures in a row
///
/// Only the first failure of a run is worth a warning; a missing model
/// fails every frame.
#[derive(Debug, Default)]
struct FailureRun {
    consecutive: u64,
}

impl FailureRun {
    /// Record a failure; true when it starts a new run
    fn failed(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive == 1
    }

    /// Record a success; returns the length of the run it ended
    fn succeeded(&mut self) -> u64 {
        std::mem::take(&mut self.consecutive)
    }
}

/// Current frame source; `generation` counts attaches
#[derive(Default)]
struct Subscription {
    frames: Option<FrameReceiver>,
    generation: u64,
}

/// Detection stage running on its own thread
pub struct FrameAnalyzer {
    subscription: Arc<Mutex<Subscription>>,
    outputs: Arc<Outputs>,
    _worker: CaptureLoopController,
}

impl FrameAnalyzer {
    /// Start the analysis thread
    ///
    /// `factory` runs on that thread, so the detector itself need not be
    /// `Send`. `preference` is read once per analyzed frame.
    pub fn spawn(factory: DetectorFactory, preference: FacePreference) -> Self {
        let subscription = Arc::new(Mutex::new(Subscription::default()));
        let outputs = Arc::new(Outputs {
            face_number: watch::channel(0).0,
            face_frames: watch::channel(Vec::new()).0,
            reports: watch::channel(None).0,
        });

        let loop_subscription = Arc::clone(&subscription);
        let loop_outputs = Arc::clone(&outputs);

        let mut failures = FailureRun::default();

        let worker = CaptureLoopController::start_with_init(
            "frame-analyzer",
            move || Ok(factory()),
            move |detector: &mut Box<dyn FaceDetector>| {
                let Some((frame, generation)) = next_frame(&loop_subscription) else {
                    std::thread::sleep(timing::ANALYZER_IDLE);
                    return LoopAction::Continue;
                };

                let result = detector.detect(&frame);
                if let Err(e) = &result {
                    if failures.failed() {
                        warn!(sequence = frame.sequence, error = %e, "Face detection failed");
                    } else {
                        debug!(sequence = frame.sequence, error = %e, "Face detection failed");
                    }
                } else {
                    let run = failures.succeeded();
                    if run > 0 {
                        info!(failed_frames = run, "Face detection recovered");
                    }
                    trace!(sequence = frame.sequence, "Analyzed frame");
                }

                // A result for a replaced subscription must not outlive the reset
                let current = loop_subscription.lock().unwrap_or_else(PoisonError::into_inner);
                if current.generation == generation {
                    loop_outputs.publish(&frame, result, preference.show_rectangles());
                } else {
                    trace!(sequence = frame.sequence, "Dropping stale result");
                }
                LoopAction::Continue
            },
        );

        info!("Frame analyzer started");
        Self {
            subscription,
            outputs,
            _worker: worker,
        }
    }

    /// Replace the frame-delivery subscription
    ///
    /// `None` detaches (e.g. photo mode); published values reset to zero.
    pub fn attach(&self, frames: Option<FrameReceiver>) {
        let attached = frames.is_some();
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscription.frames = frames;
        subscription.generation += 1;
        self.outputs.reset();
        debug!(attached, "Frame analyzer subscription replaced");
    }

    /// Latest face count
    pub fn face_number(&self) -> watch::Receiver<usize> {
        self.outputs.face_number.subscribe()
    }

    /// Latest published face boxes
    pub fn face_frames(&self) -> watch::Receiver<Vec<FrameRegion>> {
        self.outputs.face_frames.subscribe()
    }

    /// Latest full report, including detection errors
    pub fn reports(&self) -> watch::Receiver<Option<AnalysisReport>> {
        self.outputs.reports.subscribe()
    }
}

/// Take the newest unseen frame, dropping a closed subscription
fn next_frame(subscription: &Mutex<Subscription>) -> Option<(Arc<CameraFrame>, u64)> {
    let mut guard = subscription.lock().unwrap_or_else(PoisonError::into_inner);

    let (frame, closed) = match guard.frames.as_mut() {
        None => (None, false),
        Some(rx) => match rx.has_changed() {
            Ok(true) => (rx.borrow_and_update().clone(), false),
            Ok(false) => (None, false),
            Err(_) => (None, true),
        },
    };

    if closed {
        debug!("Frame delivery closed, waiting for the next attach");
        guard.frames = None;
    }
    frame.map(|frame| (frame, guard.generation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{PixelFormat, frame_channel};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn region() -> FrameRegion {
        FrameRegion {
            x: 0.1,
            y: 0.2,
            width: 0.3,
            height: 0.4,
        }
    }

    /// Finds one face in every frame
    struct OneFace;

    impl FaceDetector for OneFace {
        fn detect(&mut self, _frame: &CameraFrame) -> Result<Vec<FrameRegion>, DetectionError> {
            Ok(vec![region()])
        }
    }

    fn one_face() -> DetectorFactory {
        Box::new(|| Box::new(OneFace) as Box<dyn FaceDetector>)
    }

    /// Reports when it starts, then takes a while to find one face
    struct SlowFace {
        started: mpsc::Sender<()>,
    }

    impl FaceDetector for SlowFace {
        fn detect(&mut self, _frame: &CameraFrame) -> Result<Vec<FrameRegion>, DetectionError> {
            let _ = self.started.send(());
            std::thread::sleep(Duration::from_millis(200));
            Ok(vec![region()])
        }
    }

    fn gray_frame() -> Arc<CameraFrame> {
        Arc::new(CameraFrame::packed(2, 2, PixelFormat::Gray8, vec![0; 4]))
    }

    fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl Fn(&T) -> bool) -> T {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let value = rx.borrow_and_update().clone();
            if pred(&value) || Instant::now() > deadline {
                return value;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_publication_hides_boxes_but_keeps_count() {
        let result = Ok(vec![region(), region()]);
        assert_eq!(publication(&result, false), (2, Some(Vec::new())));
        assert_eq!(publication(&result, true), (2, Some(vec![region(), region()])));
    }

    #[test]
    fn test_publication_on_error() {
        let result = Err(DetectionError::EmptyFrame);
        assert_eq!(publication(&result, true), (0, None));
    }

    #[test]
    fn test_analyzer_publishes_from_attached_stream() {
        let preference = FacePreference::new(true);
        let analyzer = FrameAnalyzer::spawn(one_face(), preference);
        let mut faces = analyzer.face_number();
        let mut boxes = analyzer.face_frames();

        let sink = frame_channel();
        analyzer.attach(Some(sink.subscribe()));
        sink.send_replace(Some(gray_frame()));

        assert_eq!(wait_for(&mut faces, |n| *n == 1), 1);
        assert_eq!(wait_for(&mut boxes, |b| !b.is_empty()), vec![region()]);
    }

    #[test]
    fn test_preference_off_publishes_empty_boxes() {
        let preference = FacePreference::new(false);
        let analyzer = FrameAnalyzer::spawn(one_face(), preference);
        let mut reports = analyzer.reports();

        let sink = frame_channel();
        analyzer.attach(Some(sink.subscribe()));
        sink.send_replace(Some(gray_frame()));

        let report = wait_for(&mut reports, |r| r.is_some()).expect("a report");
        assert_eq!(report.face_count, 1);
        assert!(report.boxes.is_empty());
        assert_eq!(*analyzer.face_frames().borrow(), Vec::<FrameRegion>::new());
    }

    #[test]
    fn test_result_for_replaced_subscription_is_dropped() {
        let (started_tx, started_rx) = mpsc::channel();
        let factory: DetectorFactory = Box::new(move || {
            Box::new(SlowFace {
                started: started_tx,
            }) as Box<dyn FaceDetector>
        });
        let analyzer = FrameAnalyzer::spawn(factory, FacePreference::new(true));

        let sink = frame_channel();
        analyzer.attach(Some(sink.subscribe()));
        sink.send_replace(Some(gray_frame()));
        started_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("detection started");

        // Detach while the detection is still running
        analyzer.attach(None);
        std::thread::sleep(Duration::from_millis(400));

        assert_eq!(*analyzer.face_number().borrow(), 0);
        assert!(analyzer.face_frames().borrow().is_empty());
        assert!(analyzer.reports().borrow().is_none());
    }

    #[test]
    fn test_failure_run_warns_once_per_run() {
        let mut run = FailureRun::default();
        assert!(run.failed());
        assert!(!run.failed());
        assert!(!run.failed());
        assert_eq!(run.succeeded(), 3);
        assert_eq!(run.succeeded(), 0);
        assert!(run.failed());
    }
}
