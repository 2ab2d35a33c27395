//! Histogram gradient-boosted trees for multi-class classification.
//!
//! Supports:
//! - Softmax boosting with one depth-limited tree per class and round.
//! - Quantile binning of features and histogram subtraction between siblings.
//! - Seeded row/feature subsampling, so runs are reproducible.
//! - JSON model export/load.

mod binning;
mod model;
mod params;
mod train;
mod tree;

pub use binning::{BinCuts, BinnedMatrix};
pub use model::{GbdtModel, MODEL_VERSION, softmax};
pub use params::BoostParams;
pub use train::train_gbdt;
pub use tree::{Node, Tree};

use thiserror::Error;

/// Errors raised while training or applying a booster.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Training set is empty")]
    EmptyDataset,
    #[error("Feature matrix has {rows} rows but {labels} labels were given")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("Label {label} is outside 0..{num_class}")]
    LabelOutOfRange { label: i64, num_class: usize },
    #[error("Unsupported objective {0:?}")]
    UnsupportedObjective(String),
    #[error("Unsupported tree_method {0:?}")]
    UnsupportedTreeMethod(String),
    #[error("Invalid {name}: {reason}")]
    InvalidParam {
        name: &'static str,
        reason: &'static str,
    },
    #[error("Model expects {expected} features per row, got {actual}")]
    FeatureWidth { expected: usize, actual: usize },
}
