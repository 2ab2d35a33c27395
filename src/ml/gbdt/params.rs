use serde::{Deserialize, Serialize};

use super::TrainError;

/// Booster hyperparameters, named after the usual gradient-boosting options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostParams {
    /// `multi:softmax` or `multi:softprob`; both train the same model.
    pub objective: String,
    pub num_class: usize,
    /// Only `hist` is supported.
    pub tree_method: String,
    pub learning_rate: f32,
    pub max_depth: usize,
    pub num_boost_round: usize,
    pub seed: u64,
    /// Maximum number of histogram bins per feature (2..=256).
    pub max_bin: usize,
    /// L2 regularization on leaf weights.
    pub lambda: f32,
    /// Minimum loss reduction required to split.
    pub gamma: f32,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f32,
    /// Fraction of rows sampled per round.
    pub subsample: f32,
    /// Fraction of features sampled per round.
    pub colsample_bytree: f32,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            objective: "multi:softmax".to_string(),
            num_class: 10,
            tree_method: "hist".to_string(),
            learning_rate: 0.1,
            max_depth: 3,
            num_boost_round: 100,
            seed: 42,
            max_bin: 256,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
        }
    }
}

impl BoostParams {
    /// Reject combinations the trainer cannot honour.
    pub fn validate(&self) -> Result<(), TrainError> {
        if !matches!(self.objective.as_str(), "multi:softmax" | "multi:softprob") {
            return Err(TrainError::UnsupportedObjective(self.objective.clone()));
        }
        if self.tree_method != "hist" {
            return Err(TrainError::UnsupportedTreeMethod(self.tree_method.clone()));
        }
        if self.num_class < 2 {
            return invalid("num_class", "must be at least 2");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("learning_rate", "must be positive");
        }
        if !(2..=256).contains(&self.max_bin) {
            return invalid("max_bin", "must be between 2 and 256");
        }
        if self.lambda < 0.0 || self.gamma < 0.0 || self.min_child_weight < 0.0 {
            return invalid("lambda/gamma/min_child_weight", "must not be negative");
        }
        for (name, value) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return invalid(name, "must be in (0, 1]");
            }
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &'static str) -> Result<(), TrainError> {
    Err(TrainError::InvalidParam { name, reason })
}
