//! Configuration management for DazzleTest
//!
//! Handles the TOML settings file (playback behaviour, DDC/CI timing,
//! presentation) and the JSON test plans that drive a session.

mod ddc_config;
mod playback_config;
pub mod plan;

pub use ddc_config::{ChecksumMode, DdcConfig};
pub use plan::{PlanError, Step, TestPlan};
pub use playback_config::PlaybackConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/dazzletest";
pub const CONFIG_FILE: &str = "config.toml";

/// Image presentation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationConfig {
    /// Directory relative image references are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_dir: Option<PathBuf>,
}

/// Main DazzleTest configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DazzleConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub ddc: DdcConfig,

    #[serde(default)]
    pub presentation: PresentationConfig,
}

impl DazzleConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// The user file is layered over the system file, key by key.
    pub fn load_default() -> Result<Self, ConfigError> {
        let system = Path::new(CONFIG_DIR).join(CONFIG_FILE);
        let mut layers = vec![system];
        if let Some(user) = user_config_path() {
            layers.push(user);
        }
        Self::load_layered(&layers)
    }

    /// Merge every existing file in `paths`, later files taking precedence
    pub fn load_layered(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged: Option<toml::Value> = None;

        for path in paths.iter().filter(|p| p.exists()) {
            let contents = std::fs::read_to_string(path)?;
            let layer: toml::Value = toml::from_str(&contents)?;
            tracing::debug!("Loaded configuration layer {}", path.display());
            match merged.as_mut() {
                Some(base) => merge_toml(base, layer),
                None => merged = Some(layer),
            }
        }

        let config = match merged {
            Some(value) => value.try_into::<Self>()?,
            None => {
                tracing::warn!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Save to default user configuration location
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = user_config_path()
            .ok_or_else(|| ConfigError::Invalid("no home directory".to_string()))?;
        self.save(&path)
    }

    /// Reject values the playback machine cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        let playback = &self.playback;
        if playback.dim_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "playback.dim_threshold {} is above 100",
                playback.dim_threshold
            )));
        }
        if playback.inspection_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "playback.inspection_percent {} is above 100",
                playback.inspection_percent
            )));
        }
        if playback.nudge_step == 0 {
            return Err(ConfigError::Invalid(
                "playback.nudge_step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/dazzletest/config.toml`, or under `~/.config`
pub fn user_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("dazzletest").join(CONFIG_FILE))
}

/// Helper function to merge TOML values
pub fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
