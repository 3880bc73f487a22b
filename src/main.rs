// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use visio::app::VisioModel;
use visio::app::frame_processor::face_detector::factory_from_config;
use visio::backends::camera::types::CameraBackendType;
use visio::backends::camera::{CaptureSessionController, get_backend_for_type};
use visio::backends::permission::{PermissionBackend, StaticPermission, SystemPermission};
use visio::config::{ConfigStore, FacePreference};
use visio::constants::APP_NAME;

mod cli;

#[derive(Parser)]
#[command(name = "visio")]
#[command(about = "Live camera preview with face detection")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Camera backend (default from the config file)
    #[arg(short, long, value_enum, global = true)]
    backend: Option<CameraBackendType>,

    /// Configuration file (default: ~/.config/visio/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SeetaFace model file (overrides the config file)
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in terminal mode (renders camera and face boxes to the terminal)
    Terminal,

    /// List available cameras
    List,

    /// Print face detection results as JSON lines
    Detect {
        /// Stop after this many analyzed frames
        #[arg(short, long)]
        frames: Option<u64>,
    },

    /// Show or change stored preferences
    Settings {
        /// Draw face rectangles over the preview
        #[arg(long)]
        show_face_rectangles: Option<bool>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, None | Some(Commands::Terminal));
    init_logging(interactive);

    let store = match cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location()?,
    };

    if let Some(Commands::Settings {
        show_face_rectangles,
    }) = cli.command
    {
        return cli::settings(&store, show_face_rectangles);
    }

    let mut config = store.load_or_default();
    if let Some(model) = cli.model {
        config.detector_model = Some(model);
    }
    let backend_type = cli.backend.unwrap_or(config.backend);
    let backend = get_backend_for_type(backend_type, &config);
    let permission: Arc<dyn PermissionBackend> = match backend_type {
        CameraBackendType::V4l2 => Arc::new(SystemPermission::detect()),
        CameraBackendType::Virtual => Arc::new(StaticPermission::granted()),
    };

    if let Some(Commands::List) = cli.command {
        return cli::list_cameras(backend.as_ref(), permission.as_ref());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let controller = CaptureSessionController::new(backend, permission);
    let model = VisioModel::new(
        controller,
        factory_from_config(&config),
        FacePreference::new(config.show_face_rectangles),
    );

    match cli.command {
        Some(Commands::Detect { frames }) => cli::detect(&model, &runtime, frames),
        _ => visio::terminal::run(&model, &store, &runtime),
    }
}

/// Set RUST_LOG to control the level (e.g. RUST_LOG=visio=debug)
///
/// The terminal viewer owns the screen, so it logs to
/// `~/.cache/visio/visio.log` instead of stderr.
fn init_logging(interactive: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_file = interactive
        .then(|| {
            let dir = dirs::cache_dir()?.join(APP_NAME);
            std::fs::create_dir_all(&dir).ok()?;
            std::fs::File::create(dir.join(format!("{}.log", APP_NAME))).ok()
        })
        .flatten();

    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init(),
        None if interactive => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .init(),
    }
}
