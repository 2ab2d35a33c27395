//! Dataset access: the memory-mapped training cache, its writer, and the
//! labelled test split.

pub mod augment;
pub mod cache_writer;
pub mod idx;
pub mod mmap;
pub mod mnist;

use std::path::PathBuf;

use ndarray::Array2;
use thiserror::Error;

use crate::http_client::FetchError;

/// A labelled split held as a dense `(samples, features)` matrix.
#[derive(Debug, Clone)]
pub struct LabeledSplit {
    pub features: Array2<f32>,
    pub labels: Vec<i64>,
    /// Image geometry of each row, for rendering.
    pub height: usize,
    pub width: usize,
}

impl LabeledSplit {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Supplies the held-out split the model is scored against.
pub trait TestSetSource {
    fn load_test_split(&self) -> Result<LabeledSplit, DatasetError>;
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset file {path} is missing and downloads are disabled")]
    NotDownloaded { path: PathBuf },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to create dataset directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed IDX file {path}: {source}")]
    Idx {
        path: PathBuf,
        source: idx::IdxError,
    },
    #[error("Failed to download {name}: {source}")]
    Fetch { name: String, source: FetchError },
    #[error("Failed to decompress {name}: {source}")]
    Decompress {
        name: String,
        source: std::io::Error,
    },
    #[error("Image file holds {images} samples but label file holds {labels}")]
    CountMismatch { images: usize, labels: usize },
    #[error("Invalid feature matrix shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
