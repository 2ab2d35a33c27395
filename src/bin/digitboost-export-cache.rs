//! Developer utility to build the memory-mapped training cache from the MNIST
//! train split, with rotated copies for augmentation.

use std::path::PathBuf;

use digitboost::config::{self, DEFAULT_CONFIG_FILE};
use digitboost::dataset::augment::rotate_samples;
use digitboost::dataset::cache_writer::write_training_cache;
use digitboost::dataset::mnist::{MnistSource, Split};
use digitboost::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    config_path: PathBuf,
    out_dir: Option<PathBuf>,
    rotations: Vec<f32>,
    limit: Option<usize>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    let mut config = config::load_or_default(&options.config_path).map_err(|err| err.to_string())?;
    if let Some(dir) = &options.out_dir {
        config.data.mmap_dir = dir.clone();
    }

    // The cache stores pixels in [0, 1].
    let source = MnistSource::new(config.data.test_root.clone(), config.data.download, true);
    let train = source.load(Split::Train).map_err(|err| err.to_string())?;
    let samples = options.limit.unwrap_or(train.len()).min(train.len());
    let features = train.height * train.width;
    let pixels = train
        .features
        .as_slice()
        .ok_or_else(|| "Training split is not contiguous".to_string())?;

    let (pixels, labels) = rotate_samples(
        &pixels[..samples * features],
        &train.labels[..samples],
        train.height,
        train.width,
        &options.rotations,
    );
    let images_path = config.data.train_images_path();
    let labels_path = config.data.train_labels_path();
    write_training_cache(&images_path, &labels_path, &pixels, &labels, features)
        .map_err(|err| err.to_string())?;

    println!(
        "Wrote {} samples ({} source x {} rotations)",
        labels.len(),
        samples,
        options.rotations.len()
    );
    println!("Images: {}", images_path.display());
    println!("Labels: {}", labels_path.display());
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let mut out_dir = None;
    let mut rotations = vec![-15.0, 0.0, 15.0];
    let mut limit = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config_path = PathBuf::from(value);
            }
            "--out-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--out-dir requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--rotations" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--rotations requires a value".to_string())?;
                rotations = parse_angles(value)?;
            }
            "--limit" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--limit requires a value".to_string())?;
                limit = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --limit value: {value}"))?,
                );
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    Ok(CliOptions {
        config_path,
        out_dir,
        rotations,
        limit,
    })
}

fn parse_angles(value: &str) -> Result<Vec<f32>, String> {
    let angles = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>()
                .map_err(|_| format!("Invalid --rotations angle: {part}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if angles.is_empty() {
        return Err("--rotations needs at least one angle".to_string());
    }
    Ok(angles)
}

fn help_text() -> String {
    [
        "digitboost-export-cache",
        "",
        "Usage:",
        "  digitboost-export-cache [options]",
        "",
        "Options:",
        "  --config <file>        Config file (default: digitboost.toml).",
        "  --out-dir <dir>        Cache directory (default: data.mmap_dir).",
        "  --rotations <a,b,..>   Rotation angles in degrees (default: -15,0,15).",
        "  --limit <n>            Use only the first n training samples.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angles_parse_with_spaces() {
        assert_eq!(parse_angles("-15, 0,15").unwrap(), vec![-15.0, 0.0, 15.0]);
        assert!(parse_angles(",").is_err());
        assert!(parse_angles("ten").is_err());
    }
}
