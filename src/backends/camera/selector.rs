// SPDX-License-Identifier: GPL-3.0-only

//! Resolve a (mode, position, lens) request to physical devices

use super::CameraBackend;
use super::types::{CameraDevice, LensCategory, MediaMode, Position};
use crate::errors::{CameraError, CameraResult};
use std::sync::Arc;
use tracing::debug;

/// Pure query over the backend's device list
#[derive(Clone)]
pub struct DeviceSelector {
    backend: Arc<dyn CameraBackend>,
}

impl DeviceSelector {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    /// Devices matching the request, most specific kind first
    ///
    /// Never returns an empty list: no match is `DeviceNotFound`.
    pub fn resolve(
        &self,
        mode: MediaMode,
        position: Position,
        lens: LensCategory,
    ) -> CameraResult<Vec<CameraDevice>> {
        let devices = select_devices(&self.backend.enumerate_cameras(), mode, position, lens);

        debug!(
            %mode,
            %position,
            %lens,
            found = devices.len(),
            "Resolved camera devices"
        );

        if devices.is_empty() {
            return Err(CameraError::DeviceNotFound { lens, position });
        }
        Ok(devices)
    }

    /// Whether `lens` resolves at all for this mode and position
    pub fn has(&self, mode: MediaMode, position: Position, lens: LensCategory) -> bool {
        self.resolve(mode, position, lens).is_ok()
    }
}

/// Filter and order `available` by the lens category's kind preference
fn select_devices(
    available: &[CameraDevice],
    mode: MediaMode,
    position: Position,
    lens: LensCategory,
) -> Vec<CameraDevice> {
    lens.device_kinds()
        .iter()
        .flat_map(|kind| {
            available.iter().filter(move |d| {
                d.kind == *kind && d.position == position && d.captures(mode)
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::DeviceKind;

    fn device(name: &str, position: Position, kind: DeviceKind) -> CameraDevice {
        CameraDevice {
            name: name.to_string(),
            path: format!("/dev/{}", name),
            position,
            kind,
            still_capture: true,
            device_info: None,
        }
    }

    #[test]
    fn test_wide_orders_dual_wide_first() {
        let available = vec![
            device("wide", Position::Back, DeviceKind::Wide),
            device("front", Position::Front, DeviceKind::Wide),
            device("dual", Position::Back, DeviceKind::DualWide),
        ];
        let selected =
            select_devices(&available, MediaMode::Video, Position::Back, LensCategory::Wide);
        let names: Vec<_> = selected.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["dual", "wide"]);
    }

    #[test]
    fn test_none_never_matches() {
        let available = vec![device("wide", Position::Back, DeviceKind::Wide)];
        let selected =
            select_devices(&available, MediaMode::Video, Position::Back, LensCategory::None);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_photo_requires_still_capture() {
        let mut stream_only = device("wide", Position::Back, DeviceKind::Wide);
        stream_only.still_capture = false;
        let available = vec![stream_only];
        let video =
            select_devices(&available, MediaMode::Video, Position::Back, LensCategory::Wide);
        assert_eq!(video.len(), 1);
        let photo =
            select_devices(&available, MediaMode::Photo, Position::Back, LensCategory::Wide);
        assert!(photo.is_empty());
    }
}
