use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use digitboost::config::RunConfig;
use digitboost::dataset::cache_writer::write_training_cache;
use digitboost::dataset::{DatasetError, LabeledSplit, TestSetSource};
use digitboost::ml::gbdt::{BoostParams, TrainError};
use digitboost::ml::trainer::{Classifier, Trainer};
use ndarray::{Array2, ArrayView2};

pub const SIDE: usize = 28;
pub const FEATURES: usize = SIDE * SIDE;

/// Config pointing the cache and reports into `root`.
pub fn config_in(root: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.data.mmap_dir = root.join("mmap_data/large");
    config.data.download = false;
    config.report.output_dir = root.join("image/gbdt/large");
    config
}

/// Write `labels.len()` samples of `FEATURES` pixels into the configured cache.
pub fn write_cache(config: &RunConfig, pixels: &[f32], labels: &[i64]) {
    write_training_cache(
        &config.data.train_images_path(),
        &config.data.train_labels_path(),
        pixels,
        labels,
        pixels.len() / labels.len().max(1),
    )
    .expect("write cache");
}

/// Test split served from memory, counting how often it is requested.
/// Clone `loads` before handing the source to a pipeline to read it back.
pub struct StaticTestSource {
    split: LabeledSplit,
    pub loads: Rc<Cell<usize>>,
}

impl StaticTestSource {
    pub fn new(features: Array2<f32>, labels: Vec<i64>) -> Self {
        Self {
            split: LabeledSplit {
                features,
                labels,
                height: SIDE,
                width: SIDE,
            },
            loads: Rc::new(Cell::new(0)),
        }
    }

    pub fn zeros(labels: Vec<i64>) -> Self {
        Self::new(Array2::zeros((labels.len(), FEATURES)), labels)
    }
}

impl TestSetSource for StaticTestSource {
    fn load_test_split(&self) -> Result<LabeledSplit, DatasetError> {
        self.loads.set(self.loads.get() + 1);
        Ok(self.split.clone())
    }
}

/// Trainer whose model replays fixed predictions and remembers its inputs.
pub struct ScriptedTrainer {
    pub predictions: Vec<i64>,
}

#[derive(Debug)]
pub struct ScriptedModel {
    pub predictions: Vec<i64>,
    pub trained_shape: (usize, usize),
    pub trained_labels: Vec<i64>,
    pub rounds: usize,
}

impl Trainer for ScriptedTrainer {
    type Model = ScriptedModel;

    fn train(
        &self,
        features: ArrayView2<'_, f32>,
        labels: &[i64],
        params: &BoostParams,
    ) -> Result<ScriptedModel, TrainError> {
        Ok(ScriptedModel {
            predictions: self.predictions.clone(),
            trained_shape: features.dim(),
            trained_labels: labels.to_vec(),
            rounds: params.num_boost_round,
        })
    }
}

impl Classifier for ScriptedModel {
    fn predict(&self, _features: ArrayView2<'_, f32>) -> Result<Vec<i64>, TrainError> {
        Ok(self.predictions.clone())
    }
}
