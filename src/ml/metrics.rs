//! Evaluation metrics for classification models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("{predictions} predictions for {labels} labels")]
    LengthMismatch { predictions: usize, labels: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Confusion matrix over an explicit class ordering.
pub struct ConfusionMatrix {
    /// Class label for each row/column index.
    pub class_labels: Vec<i64>,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty matrix for the given class ordering.
    pub fn new(class_labels: Vec<i64>) -> Self {
        let k = class_labels.len();
        Self {
            class_labels,
            counts: vec![0; k * k],
        }
    }

    /// Tally `(truth, predicted)` label pairs.
    ///
    /// Pairs where either label is outside `class_labels` are skipped.
    pub fn from_predictions(
        truth: &[i64],
        predicted: &[i64],
        class_labels: Vec<i64>,
    ) -> Result<Self, MetricsError> {
        check_lengths(predicted, truth)?;
        let mut cm = Self::new(class_labels);
        let index: BTreeMap<i64, usize> = cm
            .class_labels
            .iter()
            .enumerate()
            .map(|(idx, &label)| (label, idx))
            .collect();
        for (t, p) in truth.iter().zip(predicted) {
            if let (Some(&ti), Some(&pi)) = (index.get(t), index.get(p)) {
                cm.add(ti, pi);
            }
        }
        Ok(cm)
    }

    pub fn n_classes(&self) -> usize {
        self.class_labels.len()
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        let k = self.n_classes();
        if truth >= k || predicted >= k {
            return;
        }
        let idx = truth * k + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes() + predicted]
    }

    /// Total number of tallied samples.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Samples per true class.
    pub fn row_sums(&self) -> Vec<u64> {
        self.counts
            .chunks(self.n_classes().max(1))
            .map(|row| row.iter().map(|&c| c as u64).sum())
            .collect()
    }

    /// Largest single cell, used to scale heatmaps.
    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Rows as nested vectors, for serialization.
    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        self.counts
            .chunks(self.n_classes().max(1))
            .map(<[u32]>::to_vec)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    /// Harmonic mean of precision and recall.
    pub f1: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Serialized evaluation summary written next to the plots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub accuracy: f32,
    pub samples: usize,
    pub class_labels: Vec<String>,
    pub per_class: Vec<PerClassMetric>,
    /// Rows are true classes, columns predicted classes.
    pub confusion_matrix: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerClassMetric {
    pub class_id: String,
    pub support: u32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl MetricsReport {
    pub fn new(accuracy: f32, samples: usize, cm: &ConfusionMatrix) -> Self {
        let class_labels: Vec<String> = cm.class_labels.iter().map(|l| l.to_string()).collect();
        let per_class = precision_recall_by_class(cm)
            .into_iter()
            .zip(&class_labels)
            .map(|(stats, class_id)| PerClassMetric {
                class_id: class_id.clone(),
                support: stats.support,
                precision: stats.precision,
                recall: stats.recall,
                f1: stats.f1,
            })
            .collect();
        Self {
            accuracy,
            samples,
            class_labels,
            per_class,
            confusion_matrix: cm.to_rows(),
        }
    }
}

/// Fraction of predictions that exactly match their label.
///
/// An empty input scores 0.
pub fn accuracy(predictions: &[i64], labels: &[i64]) -> Result<f32, MetricsError> {
    check_lengths(predictions, labels)?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    Ok(correct as f32 / labels.len() as f32)
}

/// Compute per-class precision, recall and F1 from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes();
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f32;
        let mut fp = 0f32;
        let mut fn_ = 0f32;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f32;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        stats.push(PerClassStats {
            precision,
            recall,
            f1,
            support,
        });
    }
    stats
}

/// Off-diagonal cells ordered by count, largest first: `(count, truth, predicted)`.
pub fn top_confusions(cm: &ConfusionMatrix, top: usize) -> Vec<(u32, usize, usize)> {
    let k = cm.n_classes();
    let mut confusions = Vec::new();
    for truth in 0..k {
        for pred in 0..k {
            let count = cm.get(truth, pred);
            if truth != pred && count > 0 {
                confusions.push((count, truth, pred));
            }
        }
    }
    confusions.sort_by(|a, b| b.0.cmp(&a.0));
    confusions.truncate(top);
    confusions
}

/// Sorted union of the labels seen in either list.
pub fn union_labels(truth: &[i64], predicted: &[i64]) -> Vec<i64> {
    let mut labels: Vec<i64> = truth.iter().chain(predicted).copied().collect();
    labels.sort_unstable();
    labels.dedup();
    labels
}

fn check_lengths(predictions: &[i64], labels: &[i64]) -> Result<(), MetricsError> {
    if predictions.len() != labels.len() {
        return Err(MetricsError::LengthMismatch {
            predictions: predictions.len(),
            labels: labels.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits() -> Vec<i64> {
        (0..10).collect()
    }

    #[test]
    fn perfect_predictions_score_one() {
        let labels = vec![0, 1, 2, 2, 9];
        assert_eq!(accuracy(&labels, &labels), Ok(1.0));
    }

    #[test]
    fn disjoint_predictions_score_zero() {
        let labels = vec![0, 1, 2];
        let predictions = vec![10, 11, 12];
        assert_eq!(accuracy(&predictions, &labels), Ok(0.0));
    }

    #[test]
    fn accuracy_rejects_length_mismatch() {
        assert_eq!(
            accuracy(&[1], &[1, 2]),
            Err(MetricsError::LengthMismatch {
                predictions: 1,
                labels: 2
            })
        );
    }

    #[test]
    fn row_sums_match_true_class_counts() {
        let truth = vec![0, 0, 1, 2, 2, 2];
        let predicted = vec![0, 1, 1, 2, 0, 2];
        let cm = ConfusionMatrix::from_predictions(&truth, &predicted, vec![0, 1, 2]).unwrap();
        assert_eq!(cm.row_sums(), vec![2, 1, 3]);
        assert_eq!(cm.total(), truth.len() as u64);
        assert_eq!(cm.get(2, 0), 1);
    }

    #[test]
    fn two_sample_scenario_fills_only_diagonal_cells() {
        let cm = ConfusionMatrix::from_predictions(&[3, 7], &[3, 7], digits()).unwrap();
        let nonzero: Vec<(usize, usize)> = (0..10)
            .flat_map(|t| (0..10).map(move |p| (t, p)))
            .filter(|&(t, p)| cm.get(t, p) > 0)
            .collect();
        assert_eq!(nonzero, vec![(3, 3), (7, 7)]);
    }

    #[test]
    fn labels_outside_ordering_are_skipped() {
        let cm = ConfusionMatrix::from_predictions(&[1, 5], &[1, 1], vec![0, 1]).unwrap();
        assert_eq!(cm.total(), 1);
    }

    #[test]
    fn precision_recall_and_f1() {
        let cm =
            ConfusionMatrix::from_predictions(&[0, 0, 1, 1], &[0, 1, 1, 1], vec![0, 1]).unwrap();
        let stats = precision_recall_by_class(&cm);
        assert_eq!(stats[0].precision, 1.0);
        assert_eq!(stats[0].recall, 0.5);
        assert!((stats[0].f1 - 2.0 / 3.0).abs() < 1e-6);
        assert!((stats[1].precision - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(stats[1].support, 2);
    }

    #[test]
    fn top_confusions_are_sorted_and_truncated() {
        let cm = ConfusionMatrix::from_predictions(
            &[0, 0, 0, 1, 2],
            &[1, 1, 2, 0, 2],
            vec![0, 1, 2],
        )
        .unwrap();
        assert_eq!(top_confusions(&cm, 2), vec![(2, 0, 1), (1, 0, 2)]);
    }

    #[test]
    fn union_labels_sorts_and_dedups() {
        assert_eq!(union_labels(&[3, 1, 3], &[2, 1]), vec![1, 2, 3]);
    }

    #[test]
    fn report_serializes_matrix_rows() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1], &[0, 0], vec![0, 1]).unwrap();
        let report = MetricsReport::new(0.5, 2, &cm);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["confusion_matrix"], serde_json::json!([[1, 0], [1, 0]]));
        assert_eq!(json["per_class"][1]["class_id"], "1");
    }
}
