use std::path::Path;

use super::{ReportError, ensure_parent_dir};
use crate::ml::metrics::MetricsReport;

/// Write `report` as pretty JSON, creating parent directories.
pub fn write_metrics(report: &MetricsReport, path: &Path) -> Result<(), ReportError> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(path, json).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::metrics::ConfusionMatrix;
    use tempfile::tempdir;

    #[test]
    fn metrics_file_carries_matrix_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/metrics.json");
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1], &[0, 1, 0], vec![0, 1]).unwrap();
        let report = MetricsReport::new(2.0 / 3.0, 3, &cm);
        write_metrics(&report, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["samples"], 3);
        assert_eq!(value["confusion_matrix"], serde_json::json!([[1, 0], [1, 1]]));
        assert_eq!(value["class_labels"], serde_json::json!(["0", "1"]));
    }
}
