//! Parser for the IDX container used by the MNIST distribution files.
//!
//! Layout: a big-endian `u32` magic (`0x0000_08dd` where `08` is the `u8`
//! element type and `dd` the dimension count), one big-endian `u32` per
//! dimension, then the row-major payload.

use thiserror::Error;

/// Magic number of a 3-d `u8` image file.
pub const IMAGES_MAGIC: u32 = 0x0000_0803;
/// Magic number of a 1-d `u8` label file.
pub const LABELS_MAGIC: u32 = 0x0000_0801;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdxError {
    #[error("IDX header truncated: need {needed} bytes, have {actual}")]
    TruncatedHeader { needed: usize, actual: usize },
    #[error("Unexpected IDX magic {actual:#010x} (expected {expected:#010x})")]
    BadMagic { expected: u32, actual: u32 },
    #[error("IDX payload holds {actual} bytes but the header declares {expected}")]
    PayloadLength { expected: usize, actual: usize },
}

/// Decoded `u8` images, row-major `(count, rows, cols)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    pub pixels: Vec<u8>,
}

impl IdxImages {
    pub fn sample(&self, index: usize) -> Option<&[u8]> {
        let stride = self.rows * self.cols;
        self.pixels.get(index * stride..(index + 1) * stride)
    }
}

/// Parse an IDX image file.
pub fn parse_images(bytes: &[u8]) -> Result<IdxImages, IdxError> {
    let dims = parse_header(bytes, IMAGES_MAGIC, 3)?;
    let (count, rows, cols) = (dims[0], dims[1], dims[2]);
    let expected = count
        .checked_mul(rows)
        .and_then(|v| v.checked_mul(cols))
        .unwrap_or(usize::MAX);
    let payload = payload(bytes, 3, expected)?;
    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels: payload.to_vec(),
    })
}

/// Parse an IDX label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>, IdxError> {
    let dims = parse_header(bytes, LABELS_MAGIC, 1)?;
    Ok(payload(bytes, 1, dims[0])?.to_vec())
}

fn parse_header(bytes: &[u8], magic: u32, ndims: usize) -> Result<Vec<usize>, IdxError> {
    let needed = 4 * (1 + ndims);
    if bytes.len() < needed {
        return Err(IdxError::TruncatedHeader {
            needed,
            actual: bytes.len(),
        });
    }
    let actual = read_be_u32(bytes, 0);
    if actual != magic {
        return Err(IdxError::BadMagic {
            expected: magic,
            actual,
        });
    }
    Ok((0..ndims)
        .map(|dim| read_be_u32(bytes, 4 * (dim + 1)) as usize)
        .collect())
}

fn payload(bytes: &[u8], ndims: usize, expected: usize) -> Result<&[u8], IdxError> {
    let body = &bytes[4 * (1 + ndims)..];
    if body.len() != expected {
        return Err(IdxError::PayloadLength {
            expected,
            actual: body.len(),
        });
    }
    Ok(body)
}

fn read_be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Encode `u8` images as an IDX file.
pub fn encode_images(count: usize, rows: usize, cols: usize, pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + pixels.len());
    out.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
    for dim in [count, rows, cols] {
        out.extend_from_slice(&(dim as u32).to_be_bytes());
    }
    out.extend_from_slice(pixels);
    out
}

/// Encode `u8` labels as an IDX file.
pub fn encode_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + labels.len());
    out.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    out.extend_from_slice(labels);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_image_header_and_payload() {
        let bytes = encode_images(2, 2, 3, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        let images = parse_images(&bytes).unwrap();
        assert_eq!((images.count, images.rows, images.cols), (2, 2, 3));
        assert_eq!(images.sample(1), Some(&[7u8, 8, 9, 10, 11, 12][..]));
        assert_eq!(images.sample(2), None);
    }

    #[test]
    fn label_file_with_image_magic_is_rejected() {
        let bytes = encode_images(1, 1, 1, &[0]);
        assert_eq!(
            parse_labels(&bytes),
            Err(IdxError::BadMagic {
                expected: LABELS_MAGIC,
                actual: IMAGES_MAGIC
            })
        );
    }

    #[test]
    fn truncated_payload_is_reported() {
        let mut bytes = encode_labels(&[1, 2, 3]);
        bytes.pop();
        assert_eq!(
            parse_labels(&bytes),
            Err(IdxError::PayloadLength {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn short_header_is_reported() {
        assert_eq!(
            parse_images(&[0, 0, 8, 3]),
            Err(IdxError::TruncatedHeader {
                needed: 16,
                actual: 4
            })
        );
    }
}
