//! MNIST splits read from torchvision's on-disk layout, downloading on demand.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use ndarray::Array2;
use tempfile::NamedTempFile;

use super::idx;
use super::{DatasetError, LabeledSplit, TestSetSource};
use crate::http_client::{self, RetryConfig};

/// Mirrors tried in order; each serves `<name>.gz`.
pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://ossci-datasets.s3.amazonaws.com/mnist/",
    "https://storage.googleapis.com/cvdf-datasets/mnist/",
];

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Largest compressed archive accepted from a mirror.
const MAX_ARCHIVE_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn file_names(self) -> (&'static str, &'static str) {
        match self {
            Split::Train => (TRAIN_IMAGES, TRAIN_LABELS),
            Split::Test => (TEST_IMAGES, TEST_LABELS),
        }
    }
}

/// MNIST loader rooted at `root` (files under `root/MNIST/raw`).
#[derive(Debug, Clone)]
pub struct MnistSource {
    pub root: PathBuf,
    /// Fetch missing files from the mirrors.
    pub download: bool,
    /// Scale `u8` pixels into `[0, 1]`; otherwise keep `0..=255`.
    pub normalize: bool,
    pub mirrors: Vec<String>,
}

impl MnistSource {
    pub fn new(root: impl Into<PathBuf>, download: bool, normalize: bool) -> Self {
        Self {
            root: root.into(),
            download,
            normalize,
            mirrors: DEFAULT_MIRRORS.iter().map(|url| url.to_string()).collect(),
        }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("MNIST").join("raw")
    }

    /// Load a split as a `(samples, rows * cols)` feature matrix.
    pub fn load(&self, split: Split) -> Result<LabeledSplit, DatasetError> {
        let (images_name, labels_name) = split.file_names();
        let images_path = self.ensure_file(images_name)?;
        let labels_path = self.ensure_file(labels_name)?;

        let images = idx::parse_images(&read_file(&images_path)?).map_err(|source| {
            DatasetError::Idx {
                path: images_path.clone(),
                source,
            }
        })?;
        let labels = idx::parse_labels(&read_file(&labels_path)?).map_err(|source| {
            DatasetError::Idx {
                path: labels_path.clone(),
                source,
            }
        })?;
        if images.count != labels.len() {
            return Err(DatasetError::CountMismatch {
                images: images.count,
                labels: labels.len(),
            });
        }

        let scale = if self.normalize { 1.0 / 255.0 } else { 1.0 };
        let pixels: Vec<f32> = images.pixels.iter().map(|&p| p as f32 * scale).collect();
        let features = Array2::from_shape_vec((images.count, images.rows * images.cols), pixels)?;
        tracing::info!(
            "Loaded MNIST {:?} split: {} samples of {}x{}",
            split,
            images.count,
            images.rows,
            images.cols
        );
        Ok(LabeledSplit {
            features,
            labels: labels.into_iter().map(i64::from).collect(),
            height: images.rows,
            width: images.cols,
        })
    }

    fn ensure_file(&self, name: &str) -> Result<PathBuf, DatasetError> {
        let path = self.raw_dir().join(name);
        if path.is_file() {
            return Ok(path);
        }
        if !self.download {
            return Err(DatasetError::NotDownloaded { path });
        }
        self.download_file(name, &path)?;
        Ok(path)
    }

    fn download_file(&self, name: &str, dest: &Path) -> Result<(), DatasetError> {
        let dir = self.raw_dir();
        std::fs::create_dir_all(&dir).map_err(|source| DatasetError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        let urls: Vec<String> = self
            .mirrors
            .iter()
            .map(|base| format!("{base}{name}.gz"))
            .collect();
        tracing::info!("Downloading {name} into {}", dir.display());
        let archive =
            http_client::fetch_from_mirrors(&urls, MAX_ARCHIVE_BYTES, RetryConfig::default())
                .map_err(|source| DatasetError::Fetch {
                    name: name.to_string(),
                    source,
                })?;
        let bytes = gunzip(&archive).map_err(|source| DatasetError::Decompress {
            name: name.to_string(),
            source,
        })?;
        persist_bytes(&dir, dest, &bytes)
    }
}

impl TestSetSource for MnistSource {
    fn load_test_split(&self) -> Result<LabeledSplit, DatasetError> {
        self.load(Split::Test)
    }
}

fn gunzip(archive: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(archive).read_to_end(&mut out)?;
    Ok(out)
}

fn persist_bytes(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    let write_err = |source| DatasetError::Write {
        path: dest.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(dest).map_err(|err| write_err(err.error))?;
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, DatasetError> {
    std::fs::read(path).map_err(|source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use tempfile::tempdir;

    fn seed_raw(root: &Path, images: &[u8], labels: &[u8]) {
        let raw = root.join("MNIST").join("raw");
        std::fs::create_dir_all(&raw).unwrap();
        let count = labels.len();
        std::fs::write(raw.join(TEST_IMAGES), idx::encode_images(count, 2, 2, images)).unwrap();
        std::fs::write(raw.join(TEST_LABELS), idx::encode_labels(labels)).unwrap();
    }

    #[test]
    fn loads_test_split_from_raw_dir() {
        let dir = tempdir().unwrap();
        seed_raw(dir.path(), &[0, 255, 51, 0, 255, 255, 0, 0], &[3, 7]);

        let split = MnistSource::new(dir.path(), false, true)
            .load_test_split()
            .unwrap();
        assert_eq!(split.features.dim(), (2, 4));
        assert_eq!(split.labels, vec![3, 7]);
        assert_eq!(split.features[[0, 1]], 1.0);
        assert!((split.features[[0, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn raw_pixels_are_kept_without_normalization() {
        let dir = tempdir().unwrap();
        seed_raw(dir.path(), &[0, 255, 51, 0], &[1]);
        let split = MnistSource::new(dir.path(), false, false)
            .load(Split::Test)
            .unwrap();
        assert_eq!(split.features.row(0).to_vec(), vec![0.0, 255.0, 51.0, 0.0]);
    }

    #[test]
    fn missing_files_without_download_are_reported() {
        let dir = tempdir().unwrap();
        let err = MnistSource::new(dir.path(), false, true)
            .load(Split::Test)
            .unwrap_err();
        assert!(matches!(err, DatasetError::NotDownloaded { .. }));
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("MNIST").join("raw");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join(TEST_IMAGES), idx::encode_images(1, 2, 2, &[0; 4])).unwrap();
        std::fs::write(raw.join(TEST_LABELS), idx::encode_labels(&[1, 2])).unwrap();
        let err = MnistSource::new(dir.path(), false, true)
            .load(Split::Test)
            .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::CountMismatch {
                images: 1,
                labels: 2
            }
        ));
    }

    #[test]
    fn gunzip_round_trips_archive() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"idx bytes").unwrap();
        let archive = encoder.finish().unwrap();
        assert_eq!(gunzip(&archive).unwrap(), b"idx bytes");
    }
}
