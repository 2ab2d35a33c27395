//! Writer for the headerless training cache read by [`super::mmap`].

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("{pixels} pixel values do not split into {labels} samples of {features} features")]
    LengthMismatch {
        pixels: usize,
        labels: usize,
        features: usize,
    },
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to move cache file into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

/// Write pixels and labels as little-endian `f32` / `i64` files.
///
/// Each file is written to a temporary sibling and renamed into place, so a
/// reader never observes a half-written cache.
pub fn write_training_cache(
    images_path: &Path,
    labels_path: &Path,
    pixels: &[f32],
    labels: &[i64],
    features_per_sample: usize,
) -> Result<(), CacheWriteError> {
    if labels.len().checked_mul(features_per_sample) != Some(pixels.len()) {
        return Err(CacheWriteError::LengthMismatch {
            pixels: pixels.len(),
            labels: labels.len(),
            features: features_per_sample,
        });
    }
    write_le_file(images_path, pixels.iter().map(|v| v.to_le_bytes()))?;
    write_le_file(labels_path, labels.iter().map(|v| v.to_le_bytes()))?;
    tracing::info!(
        "Wrote {} samples to {} and {}",
        labels.len(),
        images_path.display(),
        labels_path.display()
    );
    Ok(())
}

fn write_le_file<const N: usize>(
    path: &Path,
    values: impl Iterator<Item = [u8; N]>,
) -> Result<(), CacheWriteError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|source| CacheWriteError::CreateDir {
        path: parent.clone(),
        source,
    })?;
    let write_err = |source| CacheWriteError::Write {
        path: path.to_path_buf(),
        source,
    };
    let tmp = NamedTempFile::new_in(&parent).map_err(write_err)?;
    let mut writer = BufWriter::new(tmp);
    for bytes in values {
        writer.write_all(&bytes).map_err(write_err)?;
    }
    let tmp = writer
        .into_inner()
        .map_err(|err| write_err(err.into_error()))?;
    tmp.persist(path).map_err(|source| CacheWriteError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::mmap::open_training_cache;
    use tempfile::tempdir;

    #[test]
    fn written_cache_reads_back_through_mmap() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("nested/images.dat");
        let labels = dir.path().join("nested/labels.npy");
        let pixels: Vec<f32> = (0..8).map(|v| v as f32 * 0.25).collect();

        write_training_cache(&images, &labels, &pixels, &[4, -1], 4).unwrap();
        let (tensor, label_vec) = open_training_cache(&images, &labels, 1, 2, 2).unwrap();
        assert_eq!(tensor.as_slice(), pixels.as_slice());
        assert_eq!(label_vec.as_slice(), &[4, -1]);
    }

    #[test]
    fn uneven_pixel_count_is_rejected_before_writing() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images.dat");
        let labels = dir.path().join("labels.npy");
        let err = write_training_cache(&images, &labels, &[0.0; 5], &[1, 2], 4).unwrap_err();
        assert!(matches!(err, CacheWriteError::LengthMismatch { .. }));
        assert!(!images.exists());
    }
}
