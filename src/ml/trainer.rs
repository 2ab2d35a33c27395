//! Seams between the evaluation pipeline and the model implementation.

use ndarray::ArrayView2;

use super::gbdt::{BoostParams, GbdtModel, TrainError, train_gbdt};

/// A fitted model that assigns a class label to each feature row.
pub trait Classifier {
    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<i64>, TrainError>;
}

/// Fits a [`Classifier`] from a feature matrix and aligned labels.
pub trait Trainer {
    type Model: Classifier;

    fn train(
        &self,
        features: ArrayView2<'_, f32>,
        labels: &[i64],
        params: &BoostParams,
    ) -> Result<Self::Model, TrainError>;
}

/// The in-crate histogram booster.
#[derive(Debug, Clone, Copy, Default)]
pub struct GbdtTrainer;

impl Trainer for GbdtTrainer {
    type Model = GbdtModel;

    fn train(
        &self,
        features: ArrayView2<'_, f32>,
        labels: &[i64],
        params: &BoostParams,
    ) -> Result<GbdtModel, TrainError> {
        train_gbdt(features, labels, params)
    }
}

impl Classifier for GbdtModel {
    fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<i64>, TrainError> {
        self.predict_labels(features)
    }
}
