//! PNG plots and the JSON summary written after evaluation.

pub mod grid;
pub mod heatmap;
pub mod summary;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use grid::{GridSample, render_sample_grid, select_samples};
pub use heatmap::render_confusion_matrix;
pub use summary::write_metrics;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to draw {path}: {message}")]
    Draw { path: PathBuf, message: String },
    #[error("Failed to serialize metrics: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Sample {index} has {actual} pixels, expected at least {expected}")]
    TileSize {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

fn draw_error(path: &Path, err: impl std::fmt::Display) -> ReportError {
    ReportError::Draw {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Create the directory `path` will be written into.
fn ensure_parent_dir(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
