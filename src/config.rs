//! Configuration for scan sessions.
//!
//! Provides TOML-backed loading, saving, and validation of camera selection,
//! pipeline tuning, and detector settings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ScanError;
use crate::types::{Symbology, SymbologySet};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub camera: CameraSection,
    pub pipeline: PipelineSection,
    pub detector: DetectorSection,
}

/// Camera selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSection {
    /// Capture device index; `None` selects the platform default device.
    pub device_index: Option<u32>,
}

/// Frame pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Frame queue capacity between the capture and detection threads. When full,
    /// the oldest frame is dropped.
    pub queue_capacity: usize,
    /// How long the detection thread waits for a frame before re-checking the
    /// stop flag, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Maximum time `stop` waits for each worker thread to finish, in milliseconds.
    pub stop_join_timeout_ms: u64,
}

/// Detector construction settings. Applied once at session construction; there is
/// no runtime reconfiguration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSection {
    pub symbologies: Vec<Symbology>,
    /// Spend more time per frame for harder-to-read codes.
    pub try_harder: bool,
}

impl DetectorSection {
    pub fn symbology_set(&self) -> SymbologySet {
        SymbologySet::new(self.symbologies.iter().copied())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            camera: CameraSection { device_index: None },
            pipeline: PipelineSection {
                queue_capacity: 2,
                poll_timeout_ms: 50,
                stop_join_timeout_ms: 2000,
            },
            detector: DetectorSection {
                symbologies: SymbologySet::default().iter().copied().collect(),
                try_harder: true,
            },
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            ScanError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: ScanConfig = toml::from_str(&contents).map_err(|e| {
            ScanError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ScanError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ScanError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            ScanError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            ScanError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("barscan.toml")
    }

    /// Load from the default location, or fall back to defaults.
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.pipeline.queue_capacity == 0 || self.pipeline.queue_capacity > 64 {
            return Err("Queue capacity must be between 1 and 64".to_string());
        }
        if self.pipeline.poll_timeout_ms == 0 || self.pipeline.poll_timeout_ms > 1000 {
            return Err("Poll timeout must be between 1 and 1000 ms".to_string());
        }
        if self.pipeline.stop_join_timeout_ms == 0 || self.pipeline.stop_join_timeout_ms > 60_000 {
            return Err("Stop join timeout must be between 1 and 60000 ms".to_string());
        }
        if self.detector.symbologies.is_empty() {
            return Err("At least one symbology must be configured".to_string());
        }
        Ok(())
    }
}
