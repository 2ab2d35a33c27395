//! Read-only memory-mapped views over the headerless training cache.
//!
//! The cache is two files written by the export step:
//! - images: `f32` little-endian pixels laid out `(sample, channel, height, width)`;
//! - labels: `i64` little-endian class ids, one per sample.
//!
//! The sample count is never stored; it is derived from the label file length.
//! On little-endian hosts the returned arrays alias the mapped pages and nothing
//! is copied until a consumer reads it.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use memmap2::Mmap;
use ndarray::{ArrayView1, ArrayView4};
use thiserror::Error;

/// Size in bytes of one pixel value in the image file.
pub const PIXEL_BYTES: usize = std::mem::size_of::<f32>();
/// Size in bytes of one label in the label file.
pub const LABEL_BYTES: usize = std::mem::size_of::<i64>();

/// Shape of a 4-d image tensor, `(samples, channels, height, width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub samples: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub const fn new(samples: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            samples,
            channels,
            height,
            width,
        }
    }

    /// Number of values in one flattened sample.
    pub fn features_per_sample(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Total element count, or `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.samples
            .checked_mul(self.channels)?
            .checked_mul(self.height)?
            .checked_mul(self.width)
    }

    /// Expected size of the backing image file in bytes.
    pub fn byte_len(&self) -> Option<u64> {
        let elements = self.element_count()?;
        (elements as u64).checked_mul(PIXEL_BYTES as u64)
    }

    pub fn dims(&self) -> (usize, usize, usize, usize) {
        (self.samples, self.channels, self.height, self.width)
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.samples, self.channels, self.height, self.width
        )
    }
}

/// Errors raised while opening the training cache.
#[derive(Debug, Error)]
pub enum MmapError {
    #[error(
        "mmap files not found, check paths:\n{}\n{}",
        images.display(),
        labels.display()
    )]
    MissingFiles { images: PathBuf, labels: PathBuf },
    #[error("Failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Failed to map {path}: {source}")]
    Map { path: PathBuf, source: io::Error },
    #[error("{path} holds {len} bytes, not a whole number of {element_size}-byte values")]
    Misaligned {
        path: PathBuf,
        len: u64,
        element_size: usize,
    },
    #[error("Image shape {shape} does not fit in addressable memory")]
    ShapeOverflow { shape: ImageShape },
    #[error("{path} holds {actual} bytes but shape {shape} needs {expected}")]
    ShapeMismatch {
        path: PathBuf,
        shape: ImageShape,
        expected: u64,
        actual: u64,
    },
    #[error("{path} holds {actual} labels but the image shape has {expected} samples")]
    LabelCountMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid array view: {0}")]
    View(#[from] ndarray::ShapeError),
}

/// Element types stored in the cache files.
pub trait CacheElement: Pod {
    const SIZE: usize;
    fn from_le_slice(bytes: &[u8]) -> Self;
}

impl CacheElement for f32 {
    const SIZE: usize = PIXEL_BYTES;
    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; PIXEL_BYTES];
        raw.copy_from_slice(bytes);
        f32::from_le_bytes(raw)
    }
}

impl CacheElement for i64 {
    const SIZE: usize = LABEL_BYTES;
    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; LABEL_BYTES];
        raw.copy_from_slice(bytes);
        i64::from_le_bytes(raw)
    }
}

enum Storage<T> {
    /// Page-aligned mapping whose bytes already match the host layout.
    Mapped(Mmap),
    /// Decoded copy, used for empty files and big-endian hosts.
    Owned(Vec<T>),
}

/// A flat, read-only array of `T` backed by a file.
pub struct MappedArray<T> {
    storage: Storage<T>,
    path: PathBuf,
    len: usize,
}

impl<T> std::fmt::Debug for MappedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedArray")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("mapped", &self.is_memory_mapped())
            .finish()
    }
}

impl<T: CacheElement> MappedArray<T> {
    /// Map `path` read-only. The file length must be a multiple of `T::SIZE`.
    pub fn open(path: &Path) -> Result<Self, MmapError> {
        let file = File::open(path).map_err(|source| MmapError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let byte_len = file
            .metadata()
            .map_err(|source| MmapError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if byte_len % T::SIZE as u64 != 0 {
            return Err(MmapError::Misaligned {
                path: path.to_path_buf(),
                len: byte_len,
                element_size: T::SIZE,
            });
        }
        let len = (byte_len / T::SIZE as u64) as usize;
        if len == 0 {
            return Ok(Self {
                storage: Storage::Owned(Vec::new()),
                path: path.to_path_buf(),
                len,
            });
        }

        // SAFETY: the file is opened read-only and the cache is treated as
        // immutable while mapped. Truncating it from another process while this
        // value is alive would fault on access.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| MmapError::Map {
            path: path.to_path_buf(),
            source,
        })?;

        let storage = if cfg!(target_endian = "little") {
            Storage::Mapped(mmap)
        } else {
            Storage::Owned(mmap.chunks_exact(T::SIZE).map(T::from_le_slice).collect())
        };
        Ok(Self {
            storage,
            path: path.to_path_buf(),
            len,
        })
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            // Mappings start on a page boundary and the length was checked in `open`.
            Storage::Mapped(mmap) => bytemuck::cast_slice(&mmap[..]),
            Storage::Owned(values) => values,
        }
    }
}

impl<T> MappedArray<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the values alias the mapped file rather than a decoded copy.
    pub fn is_memory_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    /// Hint that the array will be read front to back.
    pub fn advise_sequential(&self) {
        #[cfg(unix)]
        {
            if let Storage::Mapped(mmap) = &self.storage
                && let Err(err) = mmap.advise(memmap2::Advice::Sequential)
            {
                tracing::debug!("madvise(SEQUENTIAL) failed for {}: {err}", self.path.display());
            }
        }
    }
}

/// Image pixels shaped as `(samples, channels, height, width)`.
#[derive(Debug)]
pub struct ImageTensor {
    data: MappedArray<f32>,
    shape: ImageShape,
}

impl ImageTensor {
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice()
    }

    /// 4-d view over the pixels.
    pub fn view(&self) -> Result<ArrayView4<'_, f32>, MmapError> {
        Ok(ArrayView4::from_shape(self.shape.dims(), self.as_slice())?)
    }

    pub fn raw(&self) -> &MappedArray<f32> {
        &self.data
    }
}

/// One `i64` label per sample.
#[derive(Debug)]
pub struct LabelVector {
    data: MappedArray<i64>,
}

impl LabelVector {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        self.data.as_slice()
    }

    pub fn view(&self) -> ArrayView1<'_, i64> {
        ArrayView1::from(self.as_slice())
    }

    pub fn raw(&self) -> &MappedArray<i64> {
        &self.data
    }
}

/// Map the image and label files with an explicit image shape.
///
/// Both paths are checked before anything is mapped; if either is missing the
/// error names both. File lengths are validated against `image_shape`.
pub fn load_from_mmap(
    images_path: &Path,
    labels_path: &Path,
    image_shape: ImageShape,
) -> Result<(ImageTensor, LabelVector), MmapError> {
    ensure_inputs_exist(images_path, labels_path)?;
    let expected = image_shape
        .byte_len()
        .ok_or(MmapError::ShapeOverflow { shape: image_shape })?;

    let pixels = MappedArray::<f32>::open(images_path)?;
    let actual = (pixels.len() * PIXEL_BYTES) as u64;
    if actual != expected {
        return Err(MmapError::ShapeMismatch {
            path: images_path.to_path_buf(),
            shape: image_shape,
            expected,
            actual,
        });
    }

    let labels = MappedArray::<i64>::open(labels_path)?;
    if labels.len() != image_shape.samples {
        return Err(MmapError::LabelCountMismatch {
            path: labels_path.to_path_buf(),
            expected: image_shape.samples,
            actual: labels.len(),
        });
    }

    Ok((
        ImageTensor {
            data: pixels,
            shape: image_shape,
        },
        LabelVector { data: labels },
    ))
}

/// Number of labels stored in `labels_path`.
pub fn read_label_count(labels_path: &Path) -> Result<usize, MmapError> {
    let len = std::fs::metadata(labels_path)
        .map_err(|source| MmapError::Open {
            path: labels_path.to_path_buf(),
            source,
        })?
        .len();
    if len % LABEL_BYTES as u64 != 0 {
        return Err(MmapError::Misaligned {
            path: labels_path.to_path_buf(),
            len,
            element_size: LABEL_BYTES,
        });
    }
    Ok((len / LABEL_BYTES as u64) as usize)
}

/// Open the training cache, deriving the sample count from the label file.
pub fn open_training_cache(
    images_path: &Path,
    labels_path: &Path,
    channels: usize,
    height: usize,
    width: usize,
) -> Result<(ImageTensor, LabelVector), MmapError> {
    ensure_inputs_exist(images_path, labels_path)?;
    let samples = read_label_count(labels_path)?;
    let shape = ImageShape::new(samples, channels, height, width);
    tracing::debug!("Training cache shape derived from labels: {shape}");
    load_from_mmap(images_path, labels_path, shape)
}

fn ensure_inputs_exist(images_path: &Path, labels_path: &Path) -> Result<(), MmapError> {
    if images_path.exists() && labels_path.exists() {
        return Ok(());
    }
    Err(MmapError::MissingFiles {
        images: images_path.to_path_buf(),
        labels: labels_path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_f32(path: &Path, values: &[f32]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(path, bytes).unwrap();
    }

    fn write_i64(path: &Path, values: &[i64]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn leading_dimension_comes_from_label_count() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images.dat");
        let labels = dir.path().join("labels.npy");
        write_f32(&images, &vec![0.5; 3 * 2 * 2]);
        write_i64(&labels, &[1, 2, 3]);

        let (tensor, label_vec) = open_training_cache(&images, &labels, 1, 2, 2).unwrap();
        assert_eq!(tensor.shape(), ImageShape::new(3, 1, 2, 2));
        assert_eq!(label_vec.len(), 3);
        assert_eq!(label_vec.as_slice(), &[1, 2, 3]);
        assert_eq!(tensor.view().unwrap().dim(), (3, 1, 2, 2));
    }

    #[test]
    fn pixels_keep_raster_order() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images.dat");
        let labels = dir.path().join("labels.npy");
        let pixels: Vec<f32> = (0..8).map(|v| v as f32).collect();
        write_f32(&images, &pixels);
        write_i64(&labels, &[0, 1]);

        let (tensor, _) = load_from_mmap(&images, &labels, ImageShape::new(2, 1, 2, 2)).unwrap();
        let view = tensor.view().unwrap();
        assert_eq!(view[[1, 0, 0, 1]], 5.0);
        assert_eq!(tensor.as_slice(), pixels.as_slice());
    }

    #[test]
    fn missing_files_name_both_paths() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("absent_images.dat");
        let labels = dir.path().join("absent_labels.npy");

        let err = open_training_cache(&images, &labels, 1, 28, 28).unwrap_err();
        assert!(matches!(err, MmapError::MissingFiles { .. }));
        let message = err.to_string();
        assert!(message.contains(&images.display().to_string()));
        assert!(message.contains(&labels.display().to_string()));
    }

    #[test]
    fn one_missing_file_still_reports_both() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images.dat");
        let labels = dir.path().join("labels.npy");
        write_f32(&images, &[0.0; 4]);

        let err = load_from_mmap(&images, &labels, ImageShape::new(1, 1, 2, 2)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("images.dat"));
        assert!(message.contains("labels.npy"));
    }

    #[test]
    fn short_image_file_is_a_shape_mismatch() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images.dat");
        let labels = dir.path().join("labels.npy");
        write_f32(&images, &[0.0; 3]);
        write_i64(&labels, &[4]);

        let err = open_training_cache(&images, &labels, 1, 2, 2).unwrap_err();
        match err {
            MmapError::ShapeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 12);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ragged_label_file_is_rejected() {
        let dir = tempdir().unwrap();
        let labels = dir.path().join("labels.npy");
        std::fs::write(&labels, [0u8; 12]).unwrap();
        let err = read_label_count(&labels).unwrap_err();
        assert!(matches!(err, MmapError::Misaligned { len: 12, .. }));
    }

    #[test]
    fn empty_cache_yields_empty_views() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images.dat");
        let labels = dir.path().join("labels.npy");
        std::fs::write(&images, b"").unwrap();
        std::fs::write(&labels, b"").unwrap();

        let (tensor, label_vec) = open_training_cache(&images, &labels, 1, 28, 28).unwrap();
        assert!(label_vec.is_empty());
        assert_eq!(tensor.view().unwrap().dim(), (0, 1, 28, 28));
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn non_empty_files_are_mapped_not_copied() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images.dat");
        let labels = dir.path().join("labels.npy");
        write_f32(&images, &[1.0; 4]);
        write_i64(&labels, &[9]);

        let (tensor, label_vec) =
            load_from_mmap(&images, &labels, ImageShape::new(1, 1, 2, 2)).unwrap();
        assert!(tensor.raw().is_memory_mapped());
        assert!(label_vec.raw().is_memory_mapped());
    }
}
