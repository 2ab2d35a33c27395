//! Feature quantization for histogram split search.
//!
//! Each feature gets ascending cut points; a value's bin is the number of cuts
//! strictly below it, so `bin <= t` is exactly `value <= cuts[t]`. NaN lands
//! in bin 0, matching the "not greater than" rule used at prediction time.

use ndarray::ArrayView2;

/// Rows sampled when choosing cut points on large inputs.
const MAX_SKETCH_ROWS: usize = 100_000;

/// Per-feature cut points.
#[derive(Debug, Clone)]
pub struct BinCuts {
    cuts: Vec<Vec<f32>>,
    offsets: Vec<usize>,
}

impl BinCuts {
    /// Choose at most `max_bin - 1` cuts per feature.
    ///
    /// Features with few distinct values get midpoints between neighbours;
    /// others get quantile cuts from an evenly strided row sample.
    pub fn build(features: ArrayView2<'_, f32>, max_bin: usize) -> Self {
        let (rows, cols) = features.dim();
        let stride = rows.div_ceil(MAX_SKETCH_ROWS).max(1);
        let mut columns: Vec<Vec<f32>> = vec![Vec::with_capacity(rows / stride + 1); cols];
        for row in features.rows().into_iter().step_by(stride) {
            for (column, &value) in columns.iter_mut().zip(row.iter()) {
                if value.is_finite() {
                    column.push(value);
                }
            }
        }

        let cuts: Vec<Vec<f32>> = columns
            .into_iter()
            .map(|mut values| {
                values.sort_unstable_by(f32::total_cmp);
                feature_cuts(&values, max_bin)
            })
            .collect();
        let mut offsets = Vec::with_capacity(cols + 1);
        let mut total = 0usize;
        offsets.push(0);
        for feature_cuts in &cuts {
            total += feature_cuts.len() + 1;
            offsets.push(total);
        }
        Self { cuts, offsets }
    }

    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    /// Number of bins for `feature`.
    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    /// Start of `feature` in a flat histogram.
    pub fn offset(&self, feature: usize) -> usize {
        self.offsets[feature]
    }

    /// Total bins over all features.
    pub fn total_bins(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn bin(&self, feature: usize, value: f32) -> u8 {
        self.cuts[feature].partition_point(|&cut| cut < value) as u8
    }

    /// Threshold such that `value <= threshold` iff `bin(value) <= split_bin`.
    pub fn threshold(&self, feature: usize, split_bin: usize) -> f32 {
        self.cuts[feature][split_bin]
    }
}

fn feature_cuts(sorted: &[f32], max_bin: usize) -> Vec<f32> {
    let max_cuts = max_bin.clamp(2, 256) - 1;
    let mut distinct = sorted.to_vec();
    distinct.dedup();
    if distinct.len() <= 1 {
        return Vec::new();
    }
    if distinct.len() - 1 <= max_cuts {
        return distinct.windows(2).map(|w| midpoint(w[0], w[1])).collect();
    }
    let n = sorted.len();
    let mut cuts: Vec<f32> = (1..=max_cuts)
        .map(|k| sorted[(k * n / (max_cuts + 1)).min(n - 1)])
        .collect();
    cuts.dedup();
    // A cut at the maximum would leave the top bin empty.
    if cuts.last() == sorted.last() {
        cuts.pop();
    }
    cuts
}

fn midpoint(a: f32, b: f32) -> f32 {
    let mid = a + (b - a) * 0.5;
    if mid < b { mid } else { a }
}

/// Row-major `u8` bin indices for every (row, feature).
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    rows: usize,
    cols: usize,
    bins: Vec<u8>,
}

impl BinnedMatrix {
    pub fn new(features: ArrayView2<'_, f32>, cuts: &BinCuts) -> Self {
        let (rows, cols) = features.dim();
        let mut bins = Vec::with_capacity(rows * cols);
        for row in features.rows() {
            bins.extend(row.iter().enumerate().map(|(j, &v)| cuts.bin(j, v)));
        }
        Self { rows, cols, bins }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[u8] {
        &self.bins[index * self.cols..(index + 1) * self.cols]
    }
}
