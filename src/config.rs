//! Configuration loading. The file is a JSON document decoded with
//! `serde_json`; a missing or unparsable file is never fatal — we log and
//! fall back to defaults (`ConfigUnavailable`, per the error design in §7).

use std::fs;
use std::path::Path;

use failure::Fail;
use log::warn;
use serde::{Deserialize, Serialize};

/// Default `perf_events` set, matching the canonical Sample Source binding's
/// recognized counter names (§4.3).
pub fn default_events() -> Vec<String> {
    [
        "cycles",
        "instructions",
        "branches",
        "branch-misses",
        "cache-references",
        "cache-misses",
        "L1-dcache-load-misses",
        "iTLB-load-misses",
        "dTLB-load-misses",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_app_directory() -> String {
    "./test_apps".to_string()
}
fn default_baseline_directory() -> String {
    "./baselines".to_string()
}
fn default_alert_output_file() -> String {
    "hpc_ids_alerts.jsonl".to_string()
}
fn default_sampling_interval_ms() -> u32 {
    200
}
fn default_runs_per_app() -> u32 {
    10
}
fn default_min_samples_per_app() -> u32 {
    50
}
fn default_max_runtime_seconds() -> u32 {
    60
}
fn default_core_affinity() -> i64 {
    0
}
fn default_medium() -> f64 {
    3.0
}
fn default_high() -> f64 {
    4.0
}
fn default_critical() -> f64 {
    5.0
}
fn default_cooldown() -> u64 {
    30
}
fn default_use_robust_statistics() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_directory: String,
    pub baseline_directory: String,
    pub alert_output_file: String,
    pub sampling_interval_ms: u32,
    pub runs_per_app: u32,
    pub min_samples_per_app: u32,
    pub max_runtime_seconds: u32,
    pub core_affinity: i64,
    pub robust_z_threshold_medium: f64,
    pub robust_z_threshold_high: f64,
    pub robust_z_threshold_critical: f64,
    pub alert_cooldown_seconds: u64,
    pub use_robust_statistics: bool,
    pub perf_events: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_directory: default_app_directory(),
            baseline_directory: default_baseline_directory(),
            alert_output_file: default_alert_output_file(),
            sampling_interval_ms: default_sampling_interval_ms(),
            runs_per_app: default_runs_per_app(),
            min_samples_per_app: default_min_samples_per_app(),
            max_runtime_seconds: default_max_runtime_seconds(),
            core_affinity: default_core_affinity(),
            robust_z_threshold_medium: default_medium(),
            robust_z_threshold_high: default_high(),
            robust_z_threshold_critical: default_critical(),
            alert_cooldown_seconds: default_cooldown(),
            use_robust_statistics: default_use_robust_statistics(),
            perf_events: default_events(),
        }
    }
}

/// The loaded thresholds didn't satisfy `medium < high < critical`.
#[derive(Debug, Fail)]
#[fail(
    display = "robust z thresholds must satisfy medium < high < critical, got {} / {} / {}",
    medium, high, critical
)]
pub struct InvalidThresholdOrdering {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Config {
    /// Enforced once at load time (§9: "enforce at config-load time, not at
    /// scoring time").
    pub fn validate(&self) -> Result<(), InvalidThresholdOrdering> {
        if self.robust_z_threshold_medium < self.robust_z_threshold_high
            && self.robust_z_threshold_high < self.robust_z_threshold_critical
        {
            Ok(())
        } else {
            Err(InvalidThresholdOrdering {
                medium: self.robust_z_threshold_medium,
                high: self.robust_z_threshold_high,
                critical: self.robust_z_threshold_critical,
            })
        }
    }

    /// Load from `path`. A missing file, an unreadable file, or malformed
    /// JSON all log a warning and fall back to `Config::default()` — the
    /// caller never sees a hard failure for `ConfigUnavailable`, matching
    /// "Missing or unparsable file: use defaults and continue" (§6).
    ///
    /// An invalid threshold ordering, however, is a configuration authoring
    /// mistake rather than an absent file, so it is reported separately
    /// rather than silently discarded.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "cannot open config file {}: {}, using defaults",
                    path.display(),
                    e
                );
                return Config::default();
            }
        };

        match serde_json::from_str::<Config>(&text) {
            Ok(config) => {
                if let Err(e) = config.validate() {
                    warn!(
                        "config file {} has invalid thresholds ({}), using defaults",
                        path.display(),
                        e
                    );
                    return Config::default();
                }
                config
            }
            Err(e) => {
                warn!(
                    "config file {} is malformed ({}), using defaults",
                    path.display(),
                    e
                );
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.sampling_interval_ms, 200);
        assert_eq!(c.runs_per_app, 10);
        assert_eq!(c.min_samples_per_app, 50);
        assert_eq!(c.max_runtime_seconds, 60);
        assert_eq!(c.core_affinity, 0);
        assert_eq!(c.robust_z_threshold_medium, 3.0);
        assert_eq!(c.robust_z_threshold_high, 4.0);
        assert_eq!(c.robust_z_threshold_critical, 5.0);
        assert_eq!(c.alert_cooldown_seconds, 30);
        assert!(c.use_robust_statistics);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/path/to/config.json");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = Config::load(&path);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"alert_cooldown_seconds": 5}"#).unwrap();

        let config = Config::load(&path);
        assert_eq!(config.alert_cooldown_seconds, 5);
        assert_eq!(config.sampling_interval_ms, 200);
    }

    #[test]
    fn invalid_threshold_ordering_is_rejected() {
        let bad = Config {
            robust_z_threshold_medium: 5.0,
            robust_z_threshold_high: 4.0,
            robust_z_threshold_critical: 3.0,
            ..Config::default()
        };
        assert!(bad.validate().is_err());
    }
}
