//! Flattening image tensors into `(sample, feature)` matrices for tabular models.

use ndarray::{ArrayView, ArrayView2, Dimension, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("Cannot flatten a 0-dimensional array")]
    NoSampleAxis,
    #[error("Cannot reshape to ({samples}, {features}): {source}")]
    Reshape {
        samples: usize,
        features: usize,
        source: ndarray::ShapeError,
    },
}

/// Collapse every axis after the first into one, in row-major order.
///
/// The result aliases the input, so a view over a memory-mapped tensor stays
/// a view over the mapping. Inputs that are not in standard layout fail.
pub fn flatten<'a, A, D>(view: ArrayView<'a, A, D>) -> Result<ArrayView2<'a, A>, FlattenError>
where
    D: Dimension,
{
    let shape = view.shape();
    let (&samples, rest) = shape.split_first().ok_or(FlattenError::NoSampleAxis)?;
    let features: usize = rest.iter().product();
    view.into_shape_with_order(Ix2(samples, features))
        .map_err(|source| FlattenError::Reshape {
            samples,
            features,
            source,
        })
}
