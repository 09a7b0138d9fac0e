//! The append-only alert destination (§6) and its file-backed implementation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::detector::Alert;
use crate::error::{Error, Result};

/// Receives Alerts as the detector emits them. A failure here is logged and
/// detection continues (`AlertSinkError`, §7 — "alerts are advisory").
pub trait AlertSink {
    fn record(&mut self, alert: &Alert) -> Result<()>;
}

/// Appends one JSON-line record per Alert to `path`, with a best-effort
/// human-readable echo to the diagnostic log (§6).
pub struct JsonlFileAlertSink {
    path: PathBuf,
}

impl JsonlFileAlertSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlFileAlertSink { path: path.into() }
    }
}

impl AlertSink for JsonlFileAlertSink {
    fn record(&mut self, alert: &Alert) -> Result<()> {
        let line = serde_json::to_string(alert).map_err(|e| Error::AlertSinkError {
            inner: e.to_string(),
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::AlertSinkError {
                inner: format!("{}: {}", self.path.display(), e),
            })?;

        writeln!(file, "{}", line).map_err(|e| Error::AlertSinkError {
            inner: format!("{}: {}", self.path.display(), e),
        })?;

        info!(
            "[{}] {} {} z={:.2} (threshold {:.2}) app={}",
            alert.severity.label(),
            alert.feature,
            alert.measured_value,
            alert.robust_z_score,
            alert.threshold,
            if alert.application_name.is_empty() {
                "<system>"
            } else {
                &alert.application_name
            }
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{BaselineType, Severity};
    use std::fs;

    fn sample_alert() -> Alert {
        Alert {
            application_name: "matmul".to_string(),
            baseline_type: BaselineType::PerApp,
            feature: "ipc".to_string(),
            measured_value: 1.5,
            baseline_median: 1.0,
            robust_z_score: 5.0,
            threshold: 5.0,
            severity: Severity::Critical,
            timestamp: 100.0,
        }
    }

    #[test]
    fn appends_one_line_per_alert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut sink = JsonlFileAlertSink::new(&path);

        sink.record(&sample_alert()).unwrap();
        sink.record(&sample_alert()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"feature\":\"ipc\""));
    }

    #[test]
    fn each_line_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut sink = JsonlFileAlertSink::new(&path);
        sink.record(&sample_alert()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let restored: Alert = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(restored, sample_alert());
    }
}
