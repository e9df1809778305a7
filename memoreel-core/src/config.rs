//! Player configuration
//!
//! Stored as JSON at `<data_dir>/MemoReel/config.json`. Every field has a
//! default, so a partial or missing file still yields a usable config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "MemoReel";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Root for the blob directory and the metadata file
    pub storage_dir: PathBuf,
    pub ffmpeg_program: PathBuf,
    /// Ambient color samples per second
    pub repaint_hz: u32,
    /// Backdrop drift tolerated before a seek, seconds
    pub backdrop_drift_secs: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_data_dir(),
            ffmpeg_program: PathBuf::from("ffmpeg"),
            repaint_hz: 60,
            backdrop_drift_secs: crate::sync::DRIFT_THRESHOLD_SECS,
        }
    }
}

impl PlayerConfig {
    /// Load from `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        std::fs::write(path, content).map_err(write_err)
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.storage_dir.join("blobs")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.storage_dir.join("session.json")
    }
}

pub fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join(CONFIG_FILE)
}
