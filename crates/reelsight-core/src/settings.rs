//! Settings Persistence System
//!
//! Provides persistent service settings with:
//! - Atomic file writes (temp file + rename)
//! - Schema validation with defaults
//! - Tolerant normalization of out-of-range values
//!
//! Storage location: {config_dir}/reelsight/settings.json

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::media::EncodeSettings;

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Settings-layer error types
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write settings: {0}")]
    Io(#[from] std::io::Error),
}

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Detection model settings
    #[serde(default)]
    pub model: ModelSettings,

    /// Delivery-encode settings
    #[serde(default)]
    pub encode: EncodeSettings,

    /// Directory where finished artifacts are written
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Explicit ffmpeg binary directory (None = auto-detect)
    #[serde(default)]
    pub ffmpeg_dir: Option<PathBuf>,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_artifact_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("reelsight")
        .join("artifacts")
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            model: ModelSettings::default(),
            encode: EncodeSettings::default(),
            artifact_dir: default_artifact_dir(),
            ffmpeg_dir: None,
        }
    }
}

impl ServiceSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Tolerant on purpose: corrects bad values instead of failing, so an
    /// old or hand-edited config cannot brick the service.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.model.confidence_threshold = clamp_f32(self.model.confidence_threshold, 0.01, 0.99);
        self.model.nms_threshold = clamp_f32(self.model.nms_threshold, 0.01, 0.99);
        // Model input sizes are stride-32 multiples.
        self.model.input_size = self.model.input_size.clamp(160, 1920) / 32 * 32;

        self.encode.crf = self.encode.crf.clamp(0, 51);
        if self.encode.video_codec.trim().is_empty() {
            self.encode.video_codec = EncodeSettings::default().video_codec;
        }
        if self.encode.preset.trim().is_empty() {
            self.encode.preset = EncodeSettings::default().preset;
        }
        if self.encode.pixel_format.trim().is_empty() {
            self.encode.pixel_format = EncodeSettings::default().pixel_format;
        }
    }
}

fn clamp_f32(value: f32, min: f32, max: f32) -> f32 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

/// Detection model settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    /// Path to the ONNX model file
    #[serde(default = "default_model_path")]
    pub path: PathBuf,

    /// Minimum class confidence to keep a detection
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU threshold for non-maximum suppression
    #[serde(default = "default_nms")]
    pub nms_threshold: f32,

    /// Square model input size in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            confidence_threshold: default_confidence(),
            nms_threshold: default_nms(),
            input_size: default_input_size(),
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/visdrone.onnx")
}

fn default_confidence() -> f32 {
    0.25
}

fn default_nms() -> f32 {
    0.45
}

fn default_input_size() -> u32 {
    640
}

/// Settings manager for loading and saving settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a manager rooted at the given config directory.
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        }
    }

    /// Manager rooted at the platform config directory.
    pub fn from_default_location() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("reelsight");
        Self::new(config_dir)
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing
    /// or unparseable.
    pub fn load(&self) -> ServiceSettings {
        if !self.settings_path.exists() {
            info!("Settings file not found, using defaults");
            return ServiceSettings::default();
        }

        let result = fs::read_to_string(&self.settings_path)
            .map_err(|e| format!("read: {e}"))
            .and_then(|content| {
                serde_json::from_str::<ServiceSettings>(&content).map_err(|e| format!("parse: {e}"))
            });

        match result {
            Ok(mut settings) => {
                settings.normalize();
                settings
            }
            Err(e) => {
                warn!("Failed to load settings, using defaults: {e}");
                ServiceSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &ServiceSettings) -> Result<ServiceSettings, SettingsError> {
        let mut normalized = settings.clone();
        normalized.normalize();

        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&normalized)?;

        // Atomic write: write to temp file, then rename.
        let temp_path = self.settings_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        if cfg!(windows) && self.settings_path.exists() {
            // Windows: rename does not overwrite.
            fs::remove_file(&self.settings_path)?;
        }
        fs::rename(&temp_path, &self.settings_path)?;

        info!(path = %self.settings_path.display(), "settings saved");
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_normal() {
        let mut settings = ServiceSettings::default();
        let before = settings.clone();
        settings.normalize();
        assert_eq!(settings, before);
    }

    #[test]
    fn test_normalize_clamps_thresholds() {
        let mut settings = ServiceSettings::default();
        settings.model.confidence_threshold = 7.5;
        settings.model.nms_threshold = f32::NAN;
        settings.model.input_size = 333;
        settings.encode.crf = 99;

        settings.normalize();

        assert_eq!(settings.model.confidence_threshold, 0.99);
        assert_eq!(settings.model.nms_threshold, 0.01);
        assert_eq!(settings.model.input_size, 320);
        assert_eq!(settings.encode.crf, 51);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::new(dir.path().to_path_buf());

        let mut settings = ServiceSettings::default();
        settings.model.confidence_threshold = 0.4;
        settings.encode.preset = "fast".to_string();

        manager.save(&settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded.model.confidence_threshold, 0.4);
        assert_eq!(loaded.encode.preset, "fast");
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::new(dir.path().join("nowhere"));
        assert_eq!(manager.load(), ServiceSettings::default());
    }

    #[test]
    fn test_load_corrupt_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::new(dir.path().to_path_buf());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(manager.settings_path(), "{ not json").unwrap();
        assert_eq!(manager.load(), ServiceSettings::default());
    }

    #[test]
    fn test_unknown_fields_use_serde_defaults() {
        let settings: ServiceSettings = serde_json::from_str(r#"{"version": 1}"#).unwrap();
        assert_eq!(settings.model, ModelSettings::default());
    }
}
