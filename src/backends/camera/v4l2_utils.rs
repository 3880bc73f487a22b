// SPDX-License-Identifier: GPL-3.0-only

//! Raw V4L2 queries
//!
//! Capability probing done with a bare `VIDIOC_QUERYCAP` ioctl so that
//! enumeration does not have to open a full `v4l` device for every node.

use super::types::DeviceInfo;
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::debug;

/// VIDIOC_QUERYCAP ioctl number
const VIDIOC_QUERYCAP: libc::c_ulong = 0x80685600;

/// Single-planar video capture
pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
/// Streaming I/O (mmap/userptr)
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;
/// Metadata capture nodes, which UVC drivers expose next to the video node
pub const V4L2_CAP_META_CAPTURE: u32 = 0x0080_0000;
/// `device_caps` is filled in
const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

/// Decoded `VIDIOC_QUERYCAP` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCapabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Capabilities of this node (device_caps when available)
    pub caps: u32,
}

impl NodeCapabilities {
    /// A streaming video capture node, as opposed to metadata or output nodes
    pub fn is_video_capture(&self) -> bool {
        self.caps & V4L2_CAP_VIDEO_CAPTURE != 0
            && self.caps & V4L2_CAP_STREAMING != 0
            && self.caps & V4L2_CAP_META_CAPTURE == 0
    }
}

fn query_v4l2_cap(fd: RawFd) -> Option<V4l2Capability> {
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP as _, &mut cap as *mut V4l2Capability) };
    if result < 0 { None } else { Some(cap) }
}

/// NUL-terminated fixed-size field to String
fn c_field(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).trim().to_string()
}

/// Query a device node's identity and capabilities
///
/// Returns `None` when the node cannot be opened or does not answer the ioctl.
pub fn query_capabilities(device_path: &str) -> Option<NodeCapabilities> {
    let file = std::fs::File::open(device_path).ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;

    let caps = if cap.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
        cap.device_caps
    } else {
        cap.capabilities
    };

    let node = NodeCapabilities {
        driver: c_field(&cap.driver),
        card: c_field(&cap.card),
        bus_info: c_field(&cap.bus_info),
        caps,
    };
    debug!(
        device_path,
        driver = %node.driver,
        card = %node.card,
        caps = format!("{:#x}", caps),
        "Queried V4L2 node"
    );
    Some(node)
}

/// Build DeviceInfo from a node path and its capabilities
///
/// Resolves symlinks (e.g. `/dev/v4l/by-id/...`) to get the real node path.
pub fn build_device_info(v4l2_path: &str, node: &NodeCapabilities) -> DeviceInfo {
    let real_path = std::fs::canonicalize(v4l2_path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| v4l2_path.to_string());

    DeviceInfo {
        card: node.card.clone(),
        driver: node.driver.clone(),
        bus_info: node.bus_info.clone(),
        path: v4l2_path.to_string(),
        real_path,
    }
}

/// `video*` node paths under `/dev`, sorted by index
pub fn video_nodes() -> Vec<String> {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return Vec::new();
    };

    let mut nodes: Vec<(u32, String)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let index = name.strip_prefix("video")?.parse::<u32>().ok()?;
            Some((index, format!("/dev/{}", name)))
        })
        .collect();
    nodes.sort();
    nodes.into_iter().map(|(_, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_field_stops_at_nul() {
        let mut field = [0u8; 16];
        field[..7].copy_from_slice(b"uvcvide");
        assert_eq!(c_field(&field), "uvcvide");
        assert_eq!(c_field(b"full-length-name"), "full-length-name");
    }

    #[test]
    fn test_metadata_node_is_not_video_capture() {
        let node = NodeCapabilities {
            driver: "uvcvideo".into(),
            card: "Integrated Camera".into(),
            bus_info: "usb-0000:00:14.0-6".into(),
            caps: V4L2_CAP_META_CAPTURE | V4L2_CAP_STREAMING,
        };
        assert!(!node.is_video_capture());

        let node = NodeCapabilities {
            caps: V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_STREAMING,
            ..node
        };
        assert!(node.is_video_capture());
    }
}
