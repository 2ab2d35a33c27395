use std::path::Path;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::{Tree, TrainError};

/// Current model JSON format version.
pub const MODEL_VERSION: i64 = 1;

/// Gradient-boosted tree ensemble for multi-class classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtModel {
    /// Model format version.
    pub model_version: i64,
    /// Number of `f32` values per feature vector.
    pub feature_len: usize,
    pub num_class: usize,
    pub objective: String,
    /// Learning rate the leaves were scaled by during training.
    pub learning_rate: f32,
    /// Initial raw logits before boosting rounds.
    pub init_raw: Vec<f32>,
    /// Shape: `[n_rounds][num_class]`.
    pub trees: Vec<Vec<Tree>>,
}

impl GbdtModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_version != MODEL_VERSION {
            return Err(format!(
                "Unsupported model_version {} (expected {MODEL_VERSION})",
                self.model_version
            ));
        }
        if self.num_class < 2 {
            return Err("Model must contain at least 2 classes".to_string());
        }
        if self.init_raw.len() != self.num_class {
            return Err("init_raw length must match num_class".to_string());
        }
        for (round_idx, round) in self.trees.iter().enumerate() {
            if round.len() != self.num_class {
                return Err(format!(
                    "Round {round_idx} has {} trees but expected {}",
                    round.len(),
                    self.num_class
                ));
            }
            for tree in round {
                tree.validate(self.feature_len)
                    .map_err(|err| format!("Round {round_idx}: {err}"))?;
            }
        }
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, String> {
        let bytes = std::fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
        let model: Self = serde_json::from_slice(&bytes).map_err(|err| err.to_string())?;
        model.validate()?;
        Ok(model)
    }

    /// Write the model as pretty JSON, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| err.to_string())?;
        }
        let bytes = serde_json::to_vec_pretty(self).map_err(|err| err.to_string())?;
        std::fs::write(path, bytes).map_err(|err| format!("{}: {err}", path.display()))
    }

    /// Predict raw logits for a feature vector.
    pub fn predict_raw(&self, features: &[f32]) -> Vec<f32> {
        let mut raw = self.init_raw.clone();
        for round in &self.trees {
            for (class_idx, tree) in round.iter().enumerate() {
                raw[class_idx] += tree.predict(features);
            }
        }
        raw
    }

    /// Predict class probabilities for a feature vector.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        softmax(&self.predict_raw(features))
    }

    /// Predict the best class index for a feature vector.
    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        argmax(&self.predict_raw(features))
    }

    /// Predict a class label for every row of `features`.
    pub fn predict_labels(&self, features: ArrayView2<'_, f32>) -> Result<Vec<i64>, TrainError> {
        if features.ncols() != self.feature_len {
            return Err(TrainError::FeatureWidth {
                expected: self.feature_len,
                actual: features.ncols(),
            });
        }
        let mut scratch = Vec::new();
        let labels = features
            .rows()
            .into_iter()
            .map(|row| {
                let values = match row.as_slice() {
                    Some(values) => values,
                    None => {
                        scratch.clear();
                        scratch.extend(row.iter().copied());
                        &scratch[..]
                    }
                };
                self.predict_class_index(values) as i64
            })
            .collect();
        Ok(labels)
    }
}

/// Compute a numerically-stable softmax for a set of logits.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    let mut out = raw.to_vec();
    softmax_in_place(&mut out);
    out
}

pub(crate) fn softmax_in_place(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max = values
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum == 0.0 || !sum.is_finite() {
        let uniform = 1.0 / values.len() as f32;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}
