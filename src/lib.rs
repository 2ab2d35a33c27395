//! Library exports for the binaries, benchmarks and tests.
/// Application directory helpers.
pub mod app_dirs;
/// Run configuration.
pub mod config;
/// Memory-mapped training cache and the MNIST test split.
pub mod dataset;
/// Tensor flattening.
pub mod features;
/// Blocking HTTP helpers for dataset downloads.
pub mod http_client;
/// Logging setup.
pub mod logging;
/// Gradient-boosted trees and evaluation metrics.
pub mod ml;
/// Train, evaluate and report.
pub mod pipeline;
/// Confusion-matrix and sample-grid plots.
pub mod report;
