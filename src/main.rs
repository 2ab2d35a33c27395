//! Train a boosted-tree digit classifier on the memory-mapped cache and
//! report test accuracy, a confusion-matrix heatmap and a sample grid.

use std::path::PathBuf;

use digitboost::config::{self, DEFAULT_CONFIG_FILE, RunConfig};
use digitboost::dataset::mnist::MnistSource;
use digitboost::logging;
use digitboost::ml::trainer::GbdtTrainer;
use digitboost::pipeline::TrainEvalPipeline;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    config_path: Option<PathBuf>,
    mmap_dir: Option<PathBuf>,
    test_root: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    rounds: Option<usize>,
    seed: Option<u64>,
    no_download: bool,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = config::load_or_default(&config_path).map_err(|err| err.to_string())?;
    apply_overrides(&mut config, &options);
    config.booster.validate().map_err(|err| err.to_string())?;

    let test_source = MnistSource::new(
        config.data.test_root.clone(),
        config.data.download,
        config.data.normalize_test_pixels,
    );
    let model_path = config.report.model_path();
    let pipeline = TrainEvalPipeline::new(GbdtTrainer, test_source, config);
    let outcome = pipeline.run().map_err(|err| err.to_string())?;

    outcome.model.save_json(&model_path)?;
    println!("Test Accuracy: {:.4}", outcome.accuracy());
    println!(
        "Confusion matrix: {}",
        outcome.artifacts.confusion_matrix.display()
    );
    println!("Sample grid: {}", outcome.artifacts.sample_grid.display());
    println!("Metrics: {}", outcome.artifacts.metrics.display());
    println!("Model: {}", model_path.display());
    Ok(())
}

fn apply_overrides(config: &mut RunConfig, options: &CliOptions) {
    if let Some(dir) = &options.mmap_dir {
        config.data.mmap_dir = dir.clone();
    }
    if let Some(root) = &options.test_root {
        config.data.test_root = root.clone();
    }
    if let Some(dir) = &options.out_dir {
        config.report.output_dir = dir.clone();
    }
    if let Some(rounds) = options.rounds {
        config.booster.num_boost_round = rounds;
    }
    if let Some(seed) = options.seed {
        config.booster.seed = seed;
    }
    if options.no_download {
        config.data.download = false;
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--mmap-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--mmap-dir requires a value".to_string())?;
                options.mmap_dir = Some(PathBuf::from(value));
            }
            "--test-root" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--test-root requires a value".to_string())?;
                options.test_root = Some(PathBuf::from(value));
            }
            "--out-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--out-dir requires a value".to_string())?;
                options.out_dir = Some(PathBuf::from(value));
            }
            "--rounds" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--rounds requires a value".to_string())?;
                options.rounds = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --rounds value: {value}"))?,
                );
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                options.seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "--no-download" => options.no_download = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "digitboost",
        "",
        "Usage:",
        "  digitboost [options]",
        "",
        "Options:",
        "  --config <file>      Config file (default: digitboost.toml).",
        "  --mmap-dir <dir>     Directory holding the training cache.",
        "  --test-root <dir>    MNIST root (files under <dir>/MNIST/raw).",
        "  --out-dir <dir>      Output directory for plots, metrics and model.",
        "  --rounds <n>         Boosting rounds (default: 100).",
        "  --seed <n>           Random seed (default: 42).",
        "  --no-download        Fail instead of downloading missing MNIST files.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn overrides_replace_config_values() {
        let options = parse_args(args(&[
            "--mmap-dir",
            "/cache",
            "--rounds",
            "7",
            "--no-download",
        ]))
        .unwrap();
        let mut config = RunConfig::default();
        apply_overrides(&mut config, &options);
        assert_eq!(config.data.mmap_dir, PathBuf::from("/cache"));
        assert_eq!(config.booster.num_boost_round, 7);
        assert!(!config.data.download);
        assert_eq!(config.booster.seed, 42);
    }

    #[test]
    fn bad_number_is_reported() {
        let err = parse_args(args(&["--seed", "x"])).unwrap_err();
        assert!(err.contains("--seed"));
        assert!(parse_args(args(&["--bogus"])).is_err());
    }
}
