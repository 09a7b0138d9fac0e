//! Host-based intrusion/anomaly detection for HPC workloads, driven by
//! hardware performance counters: ingest a sample stream, engineer
//! behavioral features per interval, score them against robust statistical
//! baselines, and emit severity-tagged alerts.

pub mod alert_sink;
pub mod baseline;
pub mod collector;
pub mod config;
pub mod detector;
pub mod error;
pub mod features;
pub mod profile;
pub mod sample;
pub mod source;
pub mod stats;

pub use baseline::{Baseline, BaselineKind, BaselineStore};
pub use collector::BaselineCollector;
pub use config::Config;
pub use detector::{Alert, AnomalyDetector, BaselineType, Severity, Thresholds};
pub use error::{Error, Result};
pub use features::{engineer_features, FeatureVector};
pub use sample::{IntervalGrouper, Sample, Target};
pub use source::{PerfStatSource, SampleSource};
