// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 device discovery and classification
//!
//! Desktop capture nodes do not report which way they face or what lens
//! they carry, so both are guessed from the card name. Configuration
//! overrides win over the guess.

use crate::backends::camera::types::{CameraDevice, DeviceKind, Position};
use crate::backends::camera::v4l2_utils::{self, NodeCapabilities};
use crate::config::DeviceOverride;
use std::collections::HashMap;
use tracing::{debug, info};

/// Enumerate streaming capture nodes under `/dev`
pub fn enumerate_devices(overrides: &HashMap<String, DeviceOverride>) -> Vec<CameraDevice> {
    let mut devices = Vec::new();

    for path in v4l2_utils::video_nodes() {
        let Some(node) = v4l2_utils::query_capabilities(&path) else {
            continue;
        };
        if !node.is_video_capture() {
            debug!(path, card = %node.card, "Skipping non-capture node");
            continue;
        }
        devices.push(classify(&path, &node, overrides.get(&path)));
    }

    info!(count = devices.len(), "Enumerated V4L2 cameras");
    devices
}

/// Build a device from a node and its optional override
pub fn classify(
    path: &str,
    node: &NodeCapabilities,
    override_: Option<&DeviceOverride>,
) -> CameraDevice {
    let position = override_
        .and_then(|o| o.position)
        .unwrap_or_else(|| guess_position(&node.card));
    let kind = override_
        .and_then(|o| o.kind)
        .unwrap_or_else(|| guess_kind(&node.card));

    let name = if node.card.is_empty() {
        path.to_string()
    } else {
        node.card.clone()
    };

    CameraDevice {
        name,
        path: path.to_string(),
        position,
        kind,
        still_capture: true,
        device_info: Some(v4l2_utils::build_device_info(path, node)),
    }
}

/// Front only on an explicit hint; unmarked cameras count as the main
/// (back) camera
fn guess_position(card: &str) -> Position {
    let card = card.to_lowercase();
    const FRONT_HINTS: &[&str] = &["front", "user", "selfie", "facetime"];

    if FRONT_HINTS.iter().any(|hint| card.contains(hint)) {
        Position::Front
    } else {
        Position::Back
    }
}

fn guess_kind(card: &str) -> DeviceKind {
    let card = card.to_lowercase();
    let words: Vec<&str> = card
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if card.contains("ultra") || card.contains("0.5x") || words.contains(&"uw") {
        DeviceKind::UltraWide
    } else if card.contains("dual") {
        DeviceKind::DualWide
    } else {
        DeviceKind::Wide
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(card: &str) -> NodeCapabilities {
        NodeCapabilities {
            driver: "uvcvideo".into(),
            card: card.into(),
            bus_info: "usb-0000:00:14.0-6".into(),
            caps: v4l2_utils::V4L2_CAP_VIDEO_CAPTURE | v4l2_utils::V4L2_CAP_STREAMING,
        }
    }

    #[test]
    fn test_position_hints() {
        assert_eq!(guess_position("Integrated Camera"), Position::Back);
        assert_eq!(guess_position("FaceTime HD Camera"), Position::Front);
        assert_eq!(guess_position("Front Sensor"), Position::Front);
    }

    #[test]
    fn test_kind_hints() {
        assert_eq!(guess_kind("Ultra Wide Camera"), DeviceKind::UltraWide);
        assert_eq!(guess_kind("rear-uw"), DeviceKind::UltraWide);
        assert_eq!(guess_kind("Dual Camera"), DeviceKind::DualWide);
        // "uw" inside a word is not a hint
        assert_eq!(guess_kind("Muwave Cam"), DeviceKind::Wide);
    }

    #[test]
    fn test_override_wins() {
        let over = DeviceOverride {
            position: Some(Position::Front),
            kind: Some(DeviceKind::UltraWide),
        };
        let device = classify("/dev/video2", &node("Integrated Camera"), Some(&over));
        assert_eq!(device.position, Position::Front);
        assert_eq!(device.kind, DeviceKind::UltraWide);
    }

    #[test]
    fn test_partial_override_keeps_guess() {
        let over = DeviceOverride {
            position: None,
            kind: Some(DeviceKind::UltraWide),
        };
        let device = classify("/dev/video0", &node("Front Camera"), Some(&over));
        assert_eq!(device.position, Position::Front);
        assert_eq!(device.kind, DeviceKind::UltraWide);
        assert_eq!(device.name, "Front Camera");
    }
}
