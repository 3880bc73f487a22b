// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion utilities
//!
//! Conversions needed between what capture nodes deliver (YUYV, MJPEG) and
//! what consumers want: RGBA for the preview, 8-bit luma for detection.

use super::types::{CameraFrame, PixelFormat};
use crate::errors::DetectionError;

/// BT.601 YUV to RGB for one pixel
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

/// Convert YUYV (YUV 4:2:2) to packed RGBA
///
/// YUYV format: Y0 U Y1 V - each 4-byte group encodes 2 pixels. Rows are
/// `stride` bytes apart; missing trailing rows are left black.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let stride = (stride as usize).max(width * 2);
    let mut rgba = vec![0u8; width * height * 4];

    for (row, out_row) in rgba.chunks_exact_mut(width * 4).enumerate() {
        let start = row * stride;
        let Some(src_row) = data.get(start..start + width * 2) else {
            break;
        };

        for (chunk, out) in src_row.chunks_exact(4).zip(out_row.chunks_exact_mut(8)) {
            let u = chunk[1] as f32 - 128.0;
            let v = chunk[3] as f32 - 128.0;
            for (i, y) in [chunk[0], chunk[2]].into_iter().enumerate() {
                let [r, g, b] = yuv_to_rgb(y as f32, u, v);
                out[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, 255]);
            }
        }
    }

    rgba
}

/// Convert RGB to RGBA by adding alpha=255
pub fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for chunk in rgb.chunks_exact(3) {
        rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
    }
    rgba
}

/// Decode one MJPEG buffer into (RGBA, width, height)
pub fn decode_mjpeg(data: &[u8]) -> Result<(Vec<u8>, u32, u32), String> {
    let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| format!("MJPEG decode failed: {}", e))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok((rgba.into_raw(), width, height))
}

/// Integer BT.601 luma
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Tightly packed 8-bit luma plane (`width * height` bytes) for a frame
pub fn frame_to_luma(frame: &CameraFrame) -> Result<Vec<u8>, DetectionError> {
    if frame.is_truncated() {
        return Err(DetectionError::EmptyFrame);
    }

    let width = frame.width as usize;
    let stride = frame.stride as usize;
    let data = frame.data_slice();
    let mut out = Vec::with_capacity(width * frame.height as usize);

    for row in data.chunks(stride).take(frame.height as usize) {
        match frame.format {
            PixelFormat::Gray8 => out.extend_from_slice(&row[..width]),
            PixelFormat::YUYV => out.extend(row[..width * 2].iter().step_by(2)),
            PixelFormat::RGBA => out.extend(
                row[..width * 4]
                    .chunks_exact(4)
                    .map(|p| luma(p[0], p[1], p[2])),
            ),
            PixelFormat::RGB24 => out.extend(
                row[..width * 3]
                    .chunks_exact(3)
                    .map(|p| luma(p[0], p[1], p[2])),
            ),
        }
    }

    Ok(out)
}

/// Sample one pixel as RGB, or `None` outside the frame
pub fn sample_rgb(frame: &CameraFrame, x: u32, y: u32) -> Option<[u8; 3]> {
    if x >= frame.width || y >= frame.height {
        return None;
    }
    let data = frame.data_slice();
    let row = y as usize * frame.stride as usize;

    match frame.format {
        PixelFormat::RGBA => {
            let i = row + x as usize * 4;
            data.get(i..i + 3).map(|p| [p[0], p[1], p[2]])
        }
        PixelFormat::RGB24 => {
            let i = row + x as usize * 3;
            data.get(i..i + 3).map(|p| [p[0], p[1], p[2]])
        }
        PixelFormat::Gray8 => data.get(row + x as usize).map(|&l| [l, l, l]),
        PixelFormat::YUYV => {
            let pair = row + (x as usize / 2) * 4;
            let p = data.get(pair..pair + 4)?;
            let y = if x % 2 == 0 { p[0] } else { p[2] };
            Some(yuv_to_rgb(y as f32, p[1] as f32 - 128.0, p[3] as f32 - 128.0))
        }
    }
}

/// Downscale a luma plane using bilinear interpolation
pub fn downscale_luma(
    luma: &[u8],
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Vec<u8> {
    let src_width = src_width as usize;
    let src_height = src_height as usize;
    let mut result = Vec::with_capacity((dst_width * dst_height) as usize);

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    let get = |px: usize, py: usize| -> f32 {
        luma.get(py * src_width + px).copied().unwrap_or(0) as f32
    };

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            let x0 = src_x as usize;
            let y0 = src_y as usize;
            let x1 = (x0 + 1).min(src_width - 1);
            let y1 = (y0 + 1).min(src_height - 1);

            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            let value = get(x0, y0) * (1.0 - x_frac) * (1.0 - y_frac)
                + get(x1, y0) * x_frac * (1.0 - y_frac)
                + get(x0, y1) * (1.0 - x_frac) * y_frac
                + get(x1, y1) * x_frac * y_frac;

            result.push(value as u8);
        }
    }

    result
}
