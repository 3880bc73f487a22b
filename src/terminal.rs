// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based camera viewer
//!
//! Renders the live preview to the terminal using Unicode half-block
//! characters, with detected faces outlined on top. Camera changes are
//! awaited before the next key is read, so at most one change is in flight.

use crate::app::{FrameRegion, VisioModel};
use crate::backends::camera::format_converters::sample_rgb;
use crate::backends::camera::types::{CameraFrame, FrameReceiver, MediaMode};
use crate::config::ConfigStore;
use crate::constants::{APP_NAME, timing};
use crate::errors::CameraResult;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{error, info};

/// Run the terminal camera viewer
///
/// The session is started before the screen is taken over, so a denied
/// permission or a missing camera is reported as a plain error.
pub fn run(
    model: &VisioModel,
    store: &ConfigStore,
    runtime: &Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    runtime.block_on(model.start_session())?;

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, model, store, runtime);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    model.stop();

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    model: &VisioModel,
    store: &ConfigStore,
    runtime: &Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut preview = model.subscribe_preview();
    let face_number = model.face_number();
    let face_frames = model.face_frames();

    let mut frame_widget = FrameWidget::new();
    let mut show_help = false;
    let mut alert: Option<String> = None;

    loop {
        if let Some(frame) = latest_frame(&mut preview) {
            frame_widget.frame = Some(frame);
        }
        frame_widget.faces = face_frames.borrow().clone();

        let message = if show_help {
            build_help_message()
        } else if let Some(alert) = &alert {
            alert.clone()
        } else {
            build_status_message(model, *face_number.borrow())
        };

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                height: area.height.saturating_sub(1),
                ..area
            };
            f.render_widget(&frame_widget, camera_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(
                StatusBar {
                    message: &message,
                    alert: alert.is_some() && !show_help,
                },
                status_area,
            );
        })?;

        if !event::poll(timing::TERMINAL_TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            break;
        }

        // Any key dismisses the alert
        alert = None;

        let change: Option<CameraResult<()>> = match key.code {
            KeyCode::Char('q') => break,
            KeyCode::Char('r') => Some(runtime.block_on(model.rotate_camera())),
            KeyCode::Char('a') => Some(runtime.block_on(model.change_camera_angle())),
            KeyCode::Char('m') => Some(runtime.block_on(model.switch_media_mode())),
            KeyCode::Char('f') => {
                let show = model.preference().toggle();
                if let Err(e) = store.set_show_face_rectangles(show) {
                    error!(error = %e, "Failed to persist face rectangle preference");
                    alert = Some(format!("Error: {}", e));
                }
                None
            }
            KeyCode::Char('p') => {
                alert = Some(capture_still(model));
                None
            }
            KeyCode::Char('h') => {
                show_help = !show_help;
                None
            }
            _ => None,
        };

        match change {
            Some(Ok(())) => {
                // The old output and its frames are gone
                preview = model.subscribe_preview();
                frame_widget.frame = None;
            }
            Some(Err(e)) => {
                error!(error = %e, "Camera change failed");
                alert = Some(format!("Error: {}", e));
            }
            None => {}
        }
    }

    Ok(())
}

/// Newest unseen preview frame
fn latest_frame(preview: &mut Option<FrameReceiver>) -> Option<Arc<CameraFrame>> {
    let rx = preview.as_mut()?;
    match rx.has_changed() {
        Ok(true) => rx.borrow_and_update().clone(),
        Ok(false) => None,
        Err(_) => {
            *preview = None;
            None
        }
    }
}

fn capture_still(model: &VisioModel) -> String {
    if model.selection().mode != MediaMode::Photo {
        return "Switch to photo mode ('m') to take a picture".to_string();
    }

    let saved = model
        .capture_still()
        .map_err(|e| e.to_string())
        .and_then(|frame| save_still(&frame, &photo_directory()).map_err(|e| e.to_string()));

    match saved {
        Ok(path) => format!("Saved: {}", path.display()),
        Err(e) => {
            error!(error = %e, "Failed to save picture");
            format!("Error: {}", e)
        }
    }
}

fn build_status_message(model: &VisioModel, faces: usize) -> String {
    let selection = model.selection();
    let mut msg = format!("{} | faces: {} | 'r' rotate", selection, faces);
    if model.has_ultra_wide() {
        msg.push_str(" | 'a' angle");
    }
    msg.push_str(" | 'm' mode");
    if selection.mode == MediaMode::Photo {
        msg.push_str(" | 'p' picture");
    }
    msg.push_str(" | 'h' help | 'q' quit");
    msg
}

fn build_help_message() -> String {
    [
        "r: Rotate camera",
        "a: Wide/ultra-wide",
        "m: Video/photo",
        "f: Face boxes",
        "p: Picture",
        "h: Toggle help",
        "q/Ctrl+C: Quit",
    ]
    .join(" | ")
}

/// `~/Pictures/visio`
fn photo_directory() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Save a still as JPEG named after the current time
pub fn save_still(frame: &CameraFrame, dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let width = frame.width;
    let height = frame.height;

    let mut rgb_data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            rgb_data.extend_from_slice(&sample_rgb(frame, x, y).unwrap_or([0, 0, 0]));
        }
    }

    let img: image::RgbImage =
        image::ImageBuffer::from_raw(width, height, rgb_data).ok_or("Failed to create image")?;

    std::fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filepath = dir.join(format!("IMG_{}.jpg", timestamp));

    img.save(&filepath)?;
    info!(path = %filepath.display(), "Picture saved");

    Ok(filepath)
}

/// Widget that renders a camera frame using half-block characters
struct FrameWidget {
    frame: Option<Arc<CameraFrame>>,
    faces: Vec<FrameRegion>,
}

impl FrameWidget {
    fn new() -> Self {
        Self {
            frame: None,
            faces: Vec::new(),
        }
    }
}

/// Where the frame lands inside the widget area, in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    x: u16,
    y: u16,
    width: u16,
    height: u16,
}

/// Fit a frame into `area` keeping its aspect ratio; each cell shows two
/// vertical pixels
fn place_frame(area: Rect, frame_width: u32, frame_height: u32) -> Placement {
    let frame_aspect = frame_width as f64 / frame_height.max(1) as f64;
    let term_width = area.width as f64;
    let term_height = (area.height * 2) as f64;

    let (width, height) = if term_width / term_height > frame_aspect {
        let h = term_height;
        ((h * frame_aspect) as u16, (h / 2.0) as u16)
    } else {
        let w = term_width;
        (w as u16, (w / frame_aspect / 2.0) as u16)
    };

    Placement {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

/// Cells on the outline of a normalized region
fn outline_cells(region: &FrameRegion, placement: Placement) -> Vec<(u16, u16)> {
    if placement.width == 0 || placement.height == 0 {
        return Vec::new();
    }
    let max_x = placement.width - 1;
    let max_y = placement.height - 1;
    let to_x = |v: f32| ((v * placement.width as f32) as u16).min(max_x);
    let to_y = |v: f32| ((v * placement.height as f32) as u16).min(max_y);

    let left = to_x(region.x);
    let right = to_x(region.x + region.width);
    let top = to_y(region.y);
    let bottom = to_y(region.y + region.height);

    let mut cells = Vec::new();
    for x in left..=right {
        cells.push((placement.x + x, placement.y + top));
        cells.push((placement.x + x, placement.y + bottom));
    }
    for y in top..=bottom {
        cells.push((placement.x + left, placement.y + y));
        cells.push((placement.x + right, placement.y + y));
    }
    cells
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = &self.frame else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        let placement = place_frame(area, frame.width, frame.height);
        if placement.width == 0 || placement.height == 0 {
            return;
        }

        let x_scale = frame.width as f64 / placement.width as f64;
        let y_scale = frame.height as f64 / (placement.height * 2) as f64;

        // Upper half (▀) colored with fg, lower half with bg
        for ty in 0..placement.height {
            for tx in 0..placement.width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let top = sample_color(frame, src_x, src_y_top);
                let bottom = sample_color(frame, src_x, src_y_bottom);

                if let Some(cell) = buf.cell_mut((placement.x + tx, placement.y + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(top);
                    cell.set_bg(bottom);
                }
            }
        }

        for region in &self.faces {
            for position in outline_cells(region, placement) {
                if let Some(cell) = buf.cell_mut(position) {
                    cell.set_char('▀');
                    cell.set_fg(Color::Green);
                    cell.set_bg(Color::Green);
                }
            }
        }
    }
}

fn sample_color(frame: &CameraFrame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width.saturating_sub(1));
    let y = y.min(frame.height.saturating_sub(1));
    let [r, g, b] = sample_rgb(frame, x, y).unwrap_or([0, 0, 0]);
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
    /// Error style
    alert: bool,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bg = if self.alert { Color::Red } else { Color::DarkGray };

        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(bg);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default().fg(Color::White).bg(bg),
        );
    }
}
