// SPDX-License-Identifier: GPL-3.0-only

//! Host boundaries
//!
//! - [`camera`]: device enumeration, capture session and frame delivery
//! - [`permission`]: camera access authorization

pub mod camera;
pub mod permission;
