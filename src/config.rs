// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in `$XDG_CONFIG_HOME/visio/config.json`. Every field has a
//! default, so a partial or missing file is fine.

use crate::backends::camera::types::{CameraBackendType, DeviceKind, Position};
use crate::constants::{APP_NAME, detection, preferences};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Manual classification for a capture node whose name gives no hints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOverride {
    pub position: Option<Position>,
    pub kind: Option<DeviceKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Draw face rectangles over the preview
    #[serde(rename = "FaceRectangles")]
    pub show_face_rectangles: bool,
    /// Camera backend to use when none is given on the command line
    pub backend: CameraBackendType,
    /// SeetaFace model file; `None` uses the file in the data directory
    pub detector_model: Option<PathBuf>,
    pub min_face_size: u32,
    /// Longer frame side after downscaling for detection
    pub max_detection_dimension: u32,
    /// Per device path (e.g. "/dev/video0")
    pub device_overrides: HashMap<String, DeviceOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_face_rectangles: false,
            backend: CameraBackendType::default(),
            detector_model: None,
            min_face_size: detection::DEFAULT_MIN_FACE_SIZE,
            max_detection_dimension: detection::DEFAULT_MAX_DIMENSION,
            device_overrides: HashMap::new(),
        }
    }
}

impl Config {
    /// Model file to load, explicit or the default in the data directory
    pub fn detector_model_path(&self) -> Option<PathBuf> {
        self.detector_model.clone().or_else(default_model_path)
    }
}

/// `$XDG_DATA_HOME/visio/seeta_fd_frontal_v1.0.bin`
pub fn default_model_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME).join(detection::DEFAULT_MODEL_FILE))
}

/// Location of the configuration file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/visio/config.json`
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(
            dir.join(APP_NAME).join(preferences::CONFIG_FILE_NAME),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file; a missing file yields the defaults
    pub fn load(&self) -> Result<Config, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file, using defaults");
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Like [`load`](Self::load), but a broken file only costs a warning
    pub fn load_or_default(&self) -> Config {
        self.load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to load config, using defaults");
            Config::default()
        })
    }

    /// Write the whole configuration, creating the directory if needed
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(config)?;

        // Write then rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        info!(path = %self.path.display(), "Saved configuration");
        Ok(())
    }

    /// Persist the face rectangle preference, keeping other fields
    pub fn set_show_face_rectangles(&self, value: bool) -> Result<Config, ConfigError> {
        let mut config = self.load_or_default();
        config.show_face_rectangles = value;
        self.save(&config)?;
        Ok(config)
    }
}

/// Live "show face rectangles" flag shared with the analysis stage
///
/// Read once per analyzed frame; written by the settings surface.
#[derive(Debug, Clone, Default)]
pub struct FacePreference(Arc<AtomicBool>);

impl FacePreference {
    pub fn new(show: bool) -> Self {
        Self(Arc::new(AtomicBool::new(show)))
    }

    pub fn show_rectangles(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_show_rectangles(&self, show: bool) {
        self.0.store(show, Ordering::Relaxed);
    }

    /// Flip the flag and return the new value
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_key_name() {
        let json = serde_json::to_value(Config::default()).expect("serializes");
        assert_eq!(json[preferences::SHOW_FACE_RECTANGLES], false);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"FaceRectangles": true}"#).expect("parses");
        assert!(config.show_face_rectangles);
        assert_eq!(config.min_face_size, detection::DEFAULT_MIN_FACE_SIZE);
        assert_eq!(config.backend, CameraBackendType::V4l2);
    }

    #[test]
    fn test_face_preference_toggle() {
        let preference = FacePreference::new(false);
        let shared = preference.clone();
        assert!(preference.toggle());
        assert!(shared.show_rectangles());
        assert!(!shared.toggle());
        assert!(!preference.show_rectangles());
    }
}
