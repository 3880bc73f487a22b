// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use visio::constants::{detection, timing, v4l2};

#[test]
fn test_detection_sizes_are_consistent() {
    assert!(detection::DEFAULT_MIN_FACE_SIZE >= detection::MIN_FACE_SIZE_FLOOR);
    assert!(detection::DEFAULT_MAX_DIMENSION > detection::DEFAULT_MIN_FACE_SIZE);
    assert!(detection::PYRAMID_SCALE_FACTOR > 0.0 && detection::PYRAMID_SCALE_FACTOR < 1.0);
}

#[test]
fn test_capture_defaults() {
    assert!(v4l2::BUFFER_COUNT >= 2, "Streaming needs at least two buffers");
    assert_eq!(v4l2::PREFERRED_FOURCCS.first(), Some(&b"YUYV"));
    assert!(v4l2::CAPTURE_WIDTH > v4l2::CAPTURE_HEIGHT);
}

#[test]
fn test_poll_is_shorter_than_start_timeout() {
    // Stop requests must be noticed before a start would time out
    assert!(timing::CAPTURE_POLL_TIMEOUT < timing::STREAM_START_TIMEOUT);
    assert!(timing::ANALYZER_IDLE < timing::TERMINAL_TICK);
}
