//! Developer utility to re-score a saved model against the MNIST test split.

use std::path::PathBuf;

use digitboost::config::{self, DEFAULT_CONFIG_FILE};
use digitboost::dataset::TestSetSource;
use digitboost::dataset::mnist::MnistSource;
use digitboost::ml::gbdt::GbdtModel;
use digitboost::ml::metrics::{precision_recall_by_class, top_confusions};
use digitboost::pipeline::evaluate;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    model_path: Option<PathBuf>,
    config_path: PathBuf,
    top: usize,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let config = config::load_or_default(&options.config_path).map_err(|err| err.to_string())?;
    let model_path = options
        .model_path
        .clone()
        .unwrap_or_else(|| config.report.model_path());
    let model = GbdtModel::load_json(&model_path)?;

    let source = MnistSource::new(
        config.data.test_root.clone(),
        config.data.download,
        config.data.normalize_test_pixels,
    );
    let test = source.load_test_split().map_err(|err| err.to_string())?;
    let class_labels: Vec<i64> = (0..model.num_class as i64).collect();
    let evaluation = evaluate(&model, &test, class_labels).map_err(|err| err.to_string())?;
    let cm = &evaluation.confusion;

    println!("accuracy: {:.4}", evaluation.accuracy);
    for (idx, stats) in precision_recall_by_class(cm).iter().enumerate() {
        println!(
            "class {:>2}  precision={:.3}  recall={:.3}  f1={:.3}  support={}",
            cm.class_labels[idx], stats.precision, stats.recall, stats.f1, stats.support
        );
    }
    println!("confusion matrix (rows=true, cols=pred):");
    for row in cm.to_rows() {
        let line: String = row.iter().map(|count| format!("{count:6}")).collect();
        println!("{line}");
    }

    println!();
    println!("Top confusions:");
    for (count, truth, pred) in top_confusions(cm, options.top) {
        println!(
            "- {} -> {}: {}",
            cm.class_labels[truth], cm.class_labels[pred], count
        );
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut model_path = None;
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let mut top = 10usize;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                model_path = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config_path = PathBuf::from(value);
            }
            "--top" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--top requires a value".to_string())?;
                top = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --top value: {value}"))?;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    Ok(CliOptions {
        model_path,
        config_path,
        top,
    })
}

fn help_text() -> String {
    [
        "digitboost-eval",
        "",
        "Usage:",
        "  digitboost-eval [options]",
        "",
        "Options:",
        "  --model <model.json>  Saved model (default: <report dir>/model.json).",
        "  --config <file>       Config file (default: digitboost.toml).",
        "  --top <n>             Top N confusions (default: 10).",
    ]
    .join("\n")
}
