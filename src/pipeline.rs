//! Train on the memory-mapped cache, score the test split, write the report.

use std::path::PathBuf;

use ndarray::ArrayView2;
use thiserror::Error;
use tracing::info;

use crate::config::RunConfig;
use crate::dataset::mmap::{MmapError, open_training_cache};
use crate::dataset::{DatasetError, LabeledSplit, TestSetSource};
use crate::features::{FlattenError, flatten};
use crate::ml::gbdt::TrainError;
use crate::ml::metrics::{ConfusionMatrix, MetricsError, MetricsReport, accuracy, union_labels};
use crate::ml::trainer::{Classifier, Trainer};
use crate::report::{self, GridSample, ReportError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Mmap(#[from] MmapError),
    #[error(transparent)]
    Flatten(#[from] FlattenError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("Test samples have {test} features but the training cache has {train}")]
    FeatureWidth { train: usize, test: usize },
}

/// Scores of one model against one labelled split.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub predictions: Vec<i64>,
    pub accuracy: f32,
    pub confusion: ConfusionMatrix,
    pub report: MetricsReport,
}

/// Files written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifacts {
    pub confusion_matrix: PathBuf,
    pub sample_grid: PathBuf,
    pub metrics: PathBuf,
}

#[derive(Debug)]
pub struct RunOutcome<M> {
    pub model: M,
    pub evaluation: Evaluation,
    pub test_labels: Vec<i64>,
    pub artifacts: ReportArtifacts,
}

impl<M> RunOutcome<M> {
    pub fn accuracy(&self) -> f32 {
        self.evaluation.accuracy
    }
}

/// The train/evaluate/report flow over pluggable trainer and test data.
pub struct TrainEvalPipeline<T, S> {
    trainer: T,
    test_source: S,
    config: RunConfig,
}

impl<T, S> TrainEvalPipeline<T, S>
where
    T: Trainer,
    S: TestSetSource,
{
    pub fn new(trainer: T, test_source: S, config: RunConfig) -> Self {
        Self {
            trainer,
            test_source,
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunOutcome<T::Model>, PipelineError> {
        let data = &self.config.data;
        let image = self.config.image;

        info!("Loading training data from mmap...");
        let (images, labels) = open_training_cache(
            &data.train_images_path(),
            &data.train_labels_path(),
            image.channels,
            image.height,
            image.width,
        )?;
        images.raw().advise_sequential();
        let tensor = images.view()?;
        let train_features = flatten(tensor)?;
        info!(
            "Training cache: {} samples x {} features",
            train_features.nrows(),
            train_features.ncols()
        );

        info!("Preparing test data...");
        let test = self.test_source.load_test_split()?;
        if test.features.ncols() != train_features.ncols() {
            return Err(PipelineError::FeatureWidth {
                train: train_features.ncols(),
                test: test.features.ncols(),
            });
        }

        info!("Training...");
        let model = self
            .trainer
            .train(train_features, labels.as_slice(), &self.config.booster)?;

        info!("Evaluating...");
        let evaluation = evaluate(&model, &test, class_ordering(&self.config))?;
        info!("Test Accuracy: {:.4}", evaluation.accuracy);

        let artifacts = write_reports(&evaluation, &test, &self.config)?;
        Ok(RunOutcome {
            model,
            evaluation,
            test_labels: test.labels,
            artifacts,
        })
    }
}

/// Class labels `0..num_class`, the base row/column order of the confusion matrix.
pub fn class_ordering(config: &RunConfig) -> Vec<i64> {
    (0..config.booster.num_class as i64).collect()
}

/// Predict `split` with `model` and tally accuracy and the confusion matrix.
///
/// The matrix covers `class_labels` plus every label seen in the truth or the
/// predictions, so its total always equals the sample count.
pub fn evaluate<C: Classifier>(
    model: &C,
    split: &LabeledSplit,
    class_labels: Vec<i64>,
) -> Result<Evaluation, PipelineError> {
    let predictions = predict(model, split.features.view())?;
    let accuracy = accuracy(&predictions, &split.labels)?;
    let mut seen = class_labels;
    seen.extend_from_slice(&split.labels);
    let ordering = union_labels(&seen, &predictions);
    let confusion = ConfusionMatrix::from_predictions(&split.labels, &predictions, ordering)?;
    let report = MetricsReport::new(accuracy, split.len(), &confusion);
    Ok(Evaluation {
        predictions,
        accuracy,
        confusion,
        report,
    })
}

fn predict<C: Classifier>(
    model: &C,
    features: ArrayView2<'_, f32>,
) -> Result<Vec<i64>, PipelineError> {
    Ok(model.predict(features)?)
}

/// Render the heatmap and sample grid and write `metrics.json`.
pub fn write_reports(
    evaluation: &Evaluation,
    split: &LabeledSplit,
    config: &RunConfig,
) -> Result<ReportArtifacts, PipelineError> {
    let settings = &config.report;
    let artifacts = ReportArtifacts {
        confusion_matrix: settings.confusion_matrix_path(),
        sample_grid: settings.sample_grid_path(),
        metrics: settings.metrics_path(),
    };

    report::render_confusion_matrix(&evaluation.confusion, &artifacts.confusion_matrix)?;
    info!(
        "Saved confusion matrix to {}",
        artifacts.confusion_matrix.display()
    );

    let picked = report::select_samples(
        split.len(),
        settings.grid_size * settings.grid_size,
        config.booster.seed,
    );
    let tiles: Vec<Vec<f32>> = picked
        .iter()
        .map(|&idx| split.features.row(idx).to_vec())
        .collect();
    let samples: Vec<GridSample<'_>> = picked
        .iter()
        .zip(&tiles)
        .map(|(&idx, pixels)| GridSample {
            pixels,
            truth: split.labels[idx],
            predicted: evaluation.predictions[idx],
        })
        .collect();
    report::render_sample_grid(
        &samples,
        split.height,
        split.width,
        settings.grid_size,
        &artifacts.sample_grid,
    )?;
    info!("Saved sample grid to {}", artifacts.sample_grid.display());

    report::write_metrics(&evaluation.report, &artifacts.metrics)?;
    info!("Saved metrics to {}", artifacts.metrics.display());
    Ok(artifacts)
}
