use std::collections::VecDeque;
use std::ops::{AddAssign, Sub};

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use super::binning::{BinCuts, BinnedMatrix};
use super::model::{GbdtModel, MODEL_VERSION, softmax_in_place};
use super::{BoostParams, Node, TrainError, Tree};

/// Smallest hessian used for a row, so pure rows still carry weight.
const MIN_HESSIAN: f32 = 1e-6;
/// Splits must reduce the loss by more than this.
const MIN_SPLIT_GAIN: f64 = 1e-6;

/// Train a multi-class boosted tree ensemble with softmax gradients.
///
/// Each round fits one depth-limited tree per class on second-order
/// gradients, searching splits over histogram bins.
pub fn train_gbdt(
    features: ArrayView2<'_, f32>,
    labels: &[i64],
    params: &BoostParams,
) -> Result<GbdtModel, TrainError> {
    params.validate()?;
    let (n, d) = features.dim();
    if n != labels.len() {
        return Err(TrainError::LengthMismatch {
            rows: n,
            labels: labels.len(),
        });
    }
    if n == 0 {
        return Err(TrainError::EmptyDataset);
    }
    let k = params.num_class;
    let y = class_indices(labels, k)?;

    tracing::info!(
        "Binning {n} rows x {d} features into at most {} bins",
        params.max_bin
    );
    let cuts = BinCuts::build(features, params.max_bin);
    let binned = BinnedMatrix::new(features, &cuts);

    let init_raw: Vec<f32> = class_priors(&y, k)
        .iter()
        .map(|&p| p.max(1e-6).ln())
        .collect();
    let mut margins: Vec<f32> = init_raw.iter().copied().cycle().take(n * k).collect();
    let mut probs = vec![0.0f32; n * k];
    let mut grad = vec![0.0f32; n];
    let mut hess = vec![0.0f32; n];
    let mut rng = StdRng::seed_from_u64(params.seed);
    let grower = TreeGrower {
        binned: &binned,
        cuts: &cuts,
        params,
    };

    let mut rounds = Vec::with_capacity(params.num_boost_round);
    for round in 0..params.num_boost_round {
        probs.copy_from_slice(&margins);
        probs.chunks_exact_mut(k).for_each(softmax_in_place);
        if round % 10 == 0 {
            tracing::debug!("round {round}: train mlogloss {:.5}", mlogloss(&probs, &y, k));
        }

        let rows = sample_rows(n, params.subsample, &mut rng);
        let feature_subset = sample_features(d, params.colsample_bytree, &mut rng);

        let mut trees = Vec::with_capacity(k);
        for class_idx in 0..k {
            for i in 0..n {
                let p = probs[i * k + class_idx];
                let target = if y[i] == class_idx { 1.0 } else { 0.0 };
                grad[i] = p - target;
                hess[i] = (2.0 * p * (1.0 - p)).max(MIN_HESSIAN);
            }
            let tree = grower.grow(&grad, &hess, rows.clone(), &feature_subset);
            for (i, row) in features.rows().into_iter().enumerate() {
                margins[i * k + class_idx] += predict_row(&tree, row);
            }
            trees.push(tree);
        }
        rounds.push(trees);
    }

    probs.copy_from_slice(&margins);
    probs.chunks_exact_mut(k).for_each(softmax_in_place);
    tracing::info!(
        "Finished {} rounds; train mlogloss {:.5}",
        params.num_boost_round,
        mlogloss(&probs, &y, k)
    );

    Ok(GbdtModel {
        model_version: MODEL_VERSION,
        feature_len: d,
        num_class: k,
        objective: params.objective.clone(),
        learning_rate: params.learning_rate,
        init_raw,
        trees: rounds,
    })
}

fn class_indices(labels: &[i64], num_class: usize) -> Result<Vec<usize>, TrainError> {
    labels
        .iter()
        .map(|&label| match usize::try_from(label) {
            Ok(idx) if idx < num_class => Ok(idx),
            _ => Err(TrainError::LabelOutOfRange { label, num_class }),
        })
        .collect()
}

fn class_priors(y: &[usize], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let total = y.len().max(1) as f32;
    counts.into_iter().map(|c| c as f32 / total).collect()
}

fn mlogloss(probs: &[f32], y: &[usize], k: usize) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let total: f64 = y
        .iter()
        .enumerate()
        .map(|(i, &label)| -(probs[i * k + label].max(1e-15) as f64).ln())
        .sum();
    total / y.len() as f64
}

fn sample_rows(n: usize, fraction: f32, rng: &mut StdRng) -> Vec<u32> {
    if fraction >= 1.0 {
        return (0..n as u32).collect();
    }
    let rows: Vec<u32> = (0..n as u32)
        .filter(|_| rng.random::<f32>() < fraction)
        .collect();
    if rows.is_empty() {
        vec![rng.random_range(0..n as u32)]
    } else {
        rows
    }
}

fn sample_features(d: usize, fraction: f32, rng: &mut StdRng) -> Vec<usize> {
    if fraction >= 1.0 || d == 0 {
        return (0..d).collect();
    }
    let amount = ((d as f32 * fraction).round() as usize).clamp(1, d);
    let mut picked = index::sample(rng, d, amount).into_vec();
    picked.sort_unstable();
    picked
}

fn predict_row(tree: &Tree, row: ndarray::ArrayView1<'_, f32>) -> f32 {
    match row.as_slice() {
        Some(values) => tree.predict(values),
        None => tree.predict(&row.to_vec()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct GradPair {
    g: f64,
    h: f64,
}

impl AddAssign for GradPair {
    fn add_assign(&mut self, rhs: Self) {
        self.g += rhs.g;
        self.h += rhs.h;
    }
}

impl Sub for GradPair {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            g: self.g - rhs.g,
            h: self.h - rhs.h,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    gain: f64,
    feature: usize,
    bin: usize,
    left: GradPair,
}

struct NodeWork {
    index: usize,
    depth: usize,
    rows: Vec<u32>,
    sum: GradPair,
    /// Absent for nodes that can only become leaves.
    hist: Option<Vec<GradPair>>,
}

struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    cuts: &'a BinCuts,
    params: &'a BoostParams,
}

impl TreeGrower<'_> {
    /// Grow one tree level by level over `rows`.
    fn grow(&self, grad: &[f32], hess: &[f32], rows: Vec<u32>, features: &[usize]) -> Tree {
        let max_depth = self.params.max_depth;
        let sum = sum_rows(&rows, grad, hess);
        let hist = (max_depth > 0).then(|| self.histogram(&rows, grad, hess, features));
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut queue = VecDeque::from([NodeWork {
            index: 0,
            depth: 0,
            rows,
            sum,
            hist,
        }]);

        while let Some(work) = queue.pop_front() {
            let split = work
                .hist
                .as_deref()
                .and_then(|hist| self.best_split(hist, work.sum, features));
            let Some(split) = split else {
                nodes[work.index] = Node::Leaf {
                    value: self.leaf_value(work.sum),
                };
                continue;
            };

            let (left_rows, right_rows): (Vec<u32>, Vec<u32>) =
                work.rows.iter().partition(|&&r| {
                    (self.binned.row(r as usize)[split.feature] as usize) <= split.bin
                });
            let left_index = nodes.len();
            let right_index = left_index + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[work.index] = Node::Split {
                feature: split.feature as u32,
                threshold: self.cuts.threshold(split.feature, split.bin),
                left: left_index as u32,
                right: right_index as u32,
            };

            let child_depth = work.depth + 1;
            let (left_hist, right_hist) = match (&work.hist, child_depth < max_depth) {
                (Some(parent), true) => {
                    // Build the smaller child, derive its sibling by subtraction.
                    if left_rows.len() <= right_rows.len() {
                        let left = self.histogram(&left_rows, grad, hess, features);
                        let right = subtract(parent, &left);
                        (Some(left), Some(right))
                    } else {
                        let right = self.histogram(&right_rows, grad, hess, features);
                        let left = subtract(parent, &right);
                        (Some(left), Some(right))
                    }
                }
                _ => (None, None),
            };
            queue.push_back(NodeWork {
                index: left_index,
                depth: child_depth,
                rows: left_rows,
                sum: split.left,
                hist: left_hist,
            });
            queue.push_back(NodeWork {
                index: right_index,
                depth: child_depth,
                rows: right_rows,
                sum: work.sum - split.left,
                hist: right_hist,
            });
        }
        Tree { nodes }
    }

    fn histogram(
        &self,
        rows: &[u32],
        grad: &[f32],
        hess: &[f32],
        features: &[usize],
    ) -> Vec<GradPair> {
        let mut hist = vec![GradPair::default(); self.cuts.total_bins()];
        for &r in rows {
            let r = r as usize;
            let bins = self.binned.row(r);
            let pair = GradPair {
                g: grad[r] as f64,
                h: hess[r] as f64,
            };
            for &j in features {
                hist[self.cuts.offset(j) + bins[j] as usize] += pair;
            }
        }
        hist
    }

    fn best_split(
        &self,
        hist: &[GradPair],
        total: GradPair,
        features: &[usize],
    ) -> Option<SplitCandidate> {
        let lambda = self.params.lambda as f64;
        let min_child = self.params.min_child_weight as f64;
        let parent_score = score(total, lambda);
        let mut best: Option<SplitCandidate> = None;
        for &feature in features {
            let offset = self.cuts.offset(feature);
            let n_bins = self.cuts.n_bins(feature);
            let mut left = GradPair::default();
            for bin in 0..n_bins.saturating_sub(1) {
                left += hist[offset + bin];
                let right = total - left;
                if left.h < min_child || right.h < min_child {
                    continue;
                }
                let gain = 0.5 * (score(left, lambda) + score(right, lambda) - parent_score)
                    - self.params.gamma as f64;
                if gain > MIN_SPLIT_GAIN && best.is_none_or(|b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        gain,
                        feature,
                        bin,
                        left,
                    });
                }
            }
        }
        best
    }

    fn leaf_value(&self, sum: GradPair) -> f32 {
        let weight = -sum.g / (sum.h + self.params.lambda as f64);
        (weight * self.params.learning_rate as f64) as f32
    }
}

fn score(pair: GradPair, lambda: f64) -> f64 {
    pair.g * pair.g / (pair.h + lambda)
}

fn sum_rows(rows: &[u32], grad: &[f32], hess: &[f32]) -> GradPair {
    let mut sum = GradPair::default();
    for &r in rows {
        sum += GradPair {
            g: grad[r as usize] as f64,
            h: hess[r as usize] as f64,
        };
    }
    sum
}

fn subtract(parent: &[GradPair], child: &[GradPair]) -> Vec<GradPair> {
    parent.iter().zip(child).map(|(&p, &c)| p - c).collect()
}
