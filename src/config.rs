//! Run configuration loaded from TOML.
//!
//! Every field has a default, so a missing file (or a partial one) reproduces
//! the stock run: cache under `./mmap_data/large`, MNIST under `./data`, plots
//! under `./image/gbdt/large`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::gbdt::BoostParams;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "digitboost.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub image: ImageSettings,
    #[serde(default)]
    pub booster: BoostParams,
    #[serde(default)]
    pub report: ReportSettings,
}

/// Where the training cache and the test split live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    #[serde(default = "default_mmap_dir")]
    pub mmap_dir: PathBuf,
    #[serde(default = "default_train_images")]
    pub train_images: String,
    #[serde(default = "default_train_labels")]
    pub train_labels: String,
    /// Root of the MNIST download (`<root>/MNIST/raw`).
    #[serde(default = "default_test_root")]
    pub test_root: PathBuf,
    #[serde(default = "default_true")]
    pub download: bool,
    /// Scale test pixels to `[0, 1]` to match the cache.
    #[serde(default = "default_true")]
    pub normalize_test_pixels: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            mmap_dir: default_mmap_dir(),
            train_images: default_train_images(),
            train_labels: default_train_labels(),
            test_root: default_test_root(),
            download: true,
            normalize_test_pixels: true,
        }
    }
}

impl DataSettings {
    pub fn train_images_path(&self) -> PathBuf {
        self.mmap_dir.join(&self.train_images)
    }

    pub fn train_labels_path(&self) -> PathBuf {
        self.mmap_dir.join(&self.train_labels)
    }
}

/// Per-sample geometry of the training cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default = "default_side")]
    pub height: usize,
    #[serde(default = "default_side")]
    pub width: usize,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            height: default_side(),
            width: default_side(),
        }
    }
}

/// Output locations for plots, metrics and the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_confusion_matrix")]
    pub confusion_matrix: String,
    #[serde(default = "default_sample_grid")]
    pub sample_grid: String,
    /// Tiles per side of the sample grid.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
    #[serde(default = "default_metrics")]
    pub metrics: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            confusion_matrix: default_confusion_matrix(),
            sample_grid: default_sample_grid(),
            grid_size: default_grid_size(),
            metrics: default_metrics(),
            model: default_model(),
        }
    }
}

impl ReportSettings {
    pub fn confusion_matrix_path(&self) -> PathBuf {
        self.output_dir.join(&self.confusion_matrix)
    }

    pub fn sample_grid_path(&self) -> PathBuf {
        self.output_dir.join(&self.sample_grid)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.output_dir.join(&self.metrics)
    }

    pub fn model_path(&self) -> PathBuf {
        self.output_dir.join(&self.model)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("Failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid setting {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl RunConfig {
    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let image = &self.image;
        if image.channels == 0 || image.height == 0 || image.width == 0 {
            return Err(ConfigError::Invalid {
                field: "image",
                reason: "channels, height and width must be positive",
            });
        }
        if self.report.grid_size == 0 {
            return Err(ConfigError::Invalid {
                field: "report.grid_size",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<RunConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {}; using defaults", path.display());
        return Ok(RunConfig::default());
    }
    let config = load_from(path)?;
    config.validate()?;
    Ok(config)
}

fn load_from(path: &Path) -> Result<RunConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &RunConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn default_true() -> bool {
    true
}

fn default_mmap_dir() -> PathBuf {
    PathBuf::from("./mmap_data/large")
}

fn default_train_images() -> String {
    "rotated_train_images.dat".to_string()
}

fn default_train_labels() -> String {
    "rotated_train_labels.npy".to_string()
}

fn default_test_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_channels() -> usize {
    1
}

fn default_side() -> usize {
    28
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./image/gbdt/large")
}

fn default_confusion_matrix() -> String {
    "confusion_matrix.png".to_string()
}

fn default_sample_grid() -> String {
    "25_images.png".to_string()
}

fn default_grid_size() -> usize {
    5
}

fn default_metrics() -> String {
    "metrics.json".to_string()
}

fn default_model() -> String {
    "model.json".to_string()
}
