// SPDX-License-Identifier: GPL-3.0-only

//! Headless commands: camera listing, detection output and settings

use chrono::Local;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};
use visio::app::{AnalysisReport, CameraSelection, VisioModel};
use visio::backends::camera::CameraBackend;
use visio::backends::camera::types::{MediaMode, OutputKind};
use visio::backends::permission::PermissionBackend;
use visio::config::ConfigStore;

/// List all cameras the backend can see
pub fn list_cameras(
    backend: &dyn CameraBackend,
    permission: &dyn PermissionBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    match permission.authorization_status(MediaMode::Video) {
        Ok(status) => println!("Camera access: {:?}", status),
        Err(e) => println!("Camera access: unknown ({})", e),
    }
    if backend.is_available() {
        println!("Backend: {}", backend.backend_type());
    } else {
        println!("Backend: {} (no capture nodes)", backend.backend_type());
    }
    println!();

    let cameras = backend.enumerate_cameras();
    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Position: {}, type: {}", camera.position, camera.kind);

        let outputs: Vec<&str> = [(OutputKind::VideoData, "video"), (OutputKind::Photo, "photo")]
            .into_iter()
            .filter(|(kind, _)| backend.supports_output(camera, *kind))
            .map(|(_, name)| name)
            .collect();
        println!("      Outputs: {}", outputs.join(", "));

        if let Some(info) = &camera.device_info {
            println!("      Driver: {} ({})", info.driver, info.bus_info);
            if info.real_path != camera.path {
                println!("      Node: {} -> {}", camera.path, info.real_path);
            } else {
                println!("      Node: {}", camera.path);
            }
        }
        println!();
    }

    Ok(())
}

/// One line of `detect` output
#[derive(Serialize)]
struct DetectionLine<'a> {
    timestamp: String,
    camera: CameraSelection,
    #[serde(flatten)]
    report: &'a AnalysisReport,
}

/// Stream analysis results as JSON lines until Ctrl+C or `frames` reports
pub fn detect(
    model: &VisioModel,
    runtime: &Runtime,
    frames: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    runtime.block_on(model.start_session())?;
    eprintln!("Detecting on {} (press Ctrl+C to stop)", model.selection());

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let mut reports = model.reports();
    let mut printed: u64 = 0;
    let stdout = std::io::stdout();

    while !stop_flag.load(Ordering::SeqCst) {
        if frames.is_some_and(|limit| printed >= limit) {
            break;
        }

        let changed = runtime.block_on(async {
            tokio::time::timeout(Duration::from_millis(100), reports.changed()).await
        });
        match changed {
            Err(_) => continue,
            Ok(Err(_)) => {
                debug!("Analyzer stopped publishing");
                break;
            }
            Ok(Ok(())) => {}
        }

        let Some(report) = reports.borrow_and_update().clone() else {
            continue;
        };
        let line = DetectionLine {
            timestamp: Local::now().to_rfc3339(),
            camera: model.selection(),
            report: &report,
        };

        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
        out.flush()?;
        printed += 1;
    }

    model.stop();
    info!(reports = printed, "Detection finished");
    Ok(())
}

/// Show or change stored preferences
pub fn settings(
    store: &ConfigStore,
    show_face_rectangles: Option<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match show_face_rectangles {
        Some(value) => {
            let config = store.set_show_face_rectangles(value)?;
            println!("Updated {}", store.path().display());
            config
        }
        None => store.load()?,
    };

    println!("Config file: {}", store.path().display());
    println!("Show face rectangles: {}", config.show_face_rectangles);
    println!("Backend: {}", config.backend);
    match config.detector_model_path() {
        Some(path) => println!(
            "Face model: {}{}",
            path.display(),
            if path.exists() { "" } else { " (missing)" }
        ),
        None => println!("Face model: none"),
    }
    println!("Minimum face size: {}px", config.min_face_size);
    println!("Detection size: {}px", config.max_detection_dimension);
    for (path, device) in &config.device_overrides {
        println!("Override {}: {:?}", path, device);
    }

    Ok(())
}

