//! Per-feature anomaly scoring against the resolved baseline, with severity
//! classification and a single global cooldown (§4.6).

use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineKind, BaselineStore};
use crate::features::{FeatureVector, FEATURE_NAMES};
use crate::stats::robust_z;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineType {
    Global,
    PerApp,
}

impl From<BaselineKind> for BaselineType {
    fn from(kind: BaselineKind) -> Self {
        match kind {
            BaselineKind::Global => BaselineType::Global,
            BaselineKind::PerApplication => BaselineType::PerApp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub application_name: String,
    pub baseline_type: BaselineType,
    pub feature: String,
    pub measured_value: f64,
    pub baseline_median: f64,
    pub robust_z_score: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub timestamp: f64,
}

/// Thresholds the detector classifies `|z|` against. Construction is
/// infallible here — `Config::validate` is the single place ordering is
/// enforced (§9: "enforce at config-load time, not at scoring time").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

fn classify(z: f64, thresholds: &Thresholds) -> Option<(Severity, f64)> {
    let magnitude = z.abs();
    if magnitude >= thresholds.critical {
        Some((Severity::Critical, thresholds.critical))
    } else if magnitude >= thresholds.high {
        Some((Severity::High, thresholds.high))
    } else if magnitude >= thresholds.medium {
        Some((Severity::Medium, thresholds.medium))
    } else {
        None
    }
}

/// The detector's one piece of persistent state is `last_alert_time`,
/// mutated only from this single-threaded detection loop (§9, §5).
pub struct AnomalyDetector {
    thresholds: Thresholds,
    cooldown_seconds: f64,
    last_alert_time: Option<f64>,
}

impl AnomalyDetector {
    pub fn new(thresholds: Thresholds, cooldown_seconds: f64) -> Self {
        AnomalyDetector {
            thresholds,
            cooldown_seconds,
            last_alert_time: None,
        }
    }

    /// Score one feature vector for `app_name` (empty for an untagged /
    /// system-wide vector) against `store`, at wall-clock `now`. Returns the
    /// alerts emitted, in fixed feature order, or an empty vec if the
    /// cooldown gate is closed or no baseline could be resolved.
    pub fn detect(
        &mut self,
        store: &BaselineStore,
        app_name: &str,
        features: &FeatureVector,
        now: f64,
    ) -> Vec<Alert> {
        let Some((kind, baseline)) = store.resolve(app_name) else {
            return Vec::new();
        };

        if let Some(last) = self.last_alert_time {
            if now - last < self.cooldown_seconds {
                return Vec::new();
            }
        }

        let mut alerts = Vec::new();
        for &name in FEATURE_NAMES.iter() {
            let value = features.get(name).expect("FEATURE_NAMES is exhaustive");
            let summary = baseline.get(name).expect("Baseline is exhaustive");
            let z = robust_z(value, summary.median, summary.mad);

            if let Some((severity, threshold)) = classify(z, &self.thresholds) {
                alerts.push(Alert {
                    application_name: app_name.to_string(),
                    baseline_type: kind.into(),
                    feature: name.to_string(),
                    measured_value: value,
                    baseline_median: summary.median,
                    robust_z_score: z,
                    threshold,
                    severity,
                    timestamp: now,
                });
            }
        }

        if !alerts.is_empty() {
            self.last_alert_time = Some(now);
        }

        alerts
    }

    pub fn last_alert_time(&self) -> Option<f64> {
        self.last_alert_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::Baseline;
    use crate::stats::summary;
    use pretty_assertions::assert_eq;

    fn thresholds() -> Thresholds {
        Thresholds {
            medium: 3.0,
            high: 4.0,
            critical: 5.0,
        }
    }

    fn baseline_with_ipc(median: f64, mad: f64) -> Baseline {
        let (flat, _) = summary(&[0.0, 0.0, 0.0]);
        Baseline {
            ipc: crate::stats::Summary {
                median,
                mad,
                min: median - mad,
                max: median + mad,
                samples: 10,
            },
            branch_miss_rate: flat,
            cache_miss_rate: flat,
            l1d_mpki: flat,
            itlb_mpki: flat,
            dtlb_mpki: flat,
        }
    }

    fn features_with_ipc(ipc: f64) -> FeatureVector {
        FeatureVector {
            wall_time: 0.0,
            ipc,
            branch_miss_rate: 0.0,
            cache_miss_rate: 0.0,
            l1d_mpki: 0.0,
            itlb_mpki: 0.0,
            dtlb_mpki: 0.0,
        }
    }

    #[test]
    fn scenario_severity_selection() {
        // spec.md §8 scenario 4
        let mut store = BaselineStore::new();
        store.set_global(baseline_with_ipc(1.0, 0.1));
        let mut detector = AnomalyDetector::new(thresholds(), 30.0);

        let alerts = detector.detect(&store, "", &features_with_ipc(1.5), 0.0);

        let ipc_alert = alerts.iter().find(|a| a.feature == "ipc").expect("ipc anomalous");
        assert_eq!(ipc_alert.robust_z_score, 5.0);
        assert_eq!(ipc_alert.severity, Severity::Critical);
        assert_eq!(ipc_alert.threshold, 5.0);
    }

    #[test]
    fn scenario_cooldown() {
        // spec.md §8 scenario 5
        let mut store = BaselineStore::new();
        store.set_global(baseline_with_ipc(1.0, 0.1));
        let mut detector = AnomalyDetector::new(thresholds(), 30.0);

        let first = detector.detect(&store, "", &features_with_ipc(1.5), 100.0);
        assert!(!first.is_empty());
        assert_eq!(detector.last_alert_time(), Some(100.0));

        let second = detector.detect(&store, "", &features_with_ipc(1.5), 110.0);
        assert!(second.is_empty());
        assert_eq!(detector.last_alert_time(), Some(100.0));
    }

    #[test]
    fn scenario_baseline_resolution() {
        // spec.md §8 scenario 6
        let mut store = BaselineStore::new();
        store.set_global(baseline_with_ipc(1.0, 0.1));
        store.set_app("matmul", baseline_with_ipc(2.0, 0.1));
        let mut detector = AnomalyDetector::new(thresholds(), 0.0);

        let tagged = detector.detect(&store, "matmul", &features_with_ipc(2.5), 0.0);
        assert_eq!(tagged[0].baseline_type, BaselineType::PerApp);

        let mut detector = AnomalyDetector::new(thresholds(), 0.0);
        let untagged = detector.detect(&store, "", &features_with_ipc(1.5), 0.0);
        assert_eq!(untagged[0].baseline_type, BaselineType::Global);
    }

    #[test]
    fn below_medium_threshold_emits_nothing_and_leaves_cooldown_untouched() {
        let mut store = BaselineStore::new();
        store.set_global(baseline_with_ipc(1.0, 0.1));
        let mut detector = AnomalyDetector::new(thresholds(), 30.0);

        let alerts = detector.detect(&store, "", &features_with_ipc(1.05), 5.0);
        assert!(alerts.is_empty());
        assert_eq!(detector.last_alert_time(), None);
    }

    #[test]
    fn alerts_emitted_in_fixed_feature_order() {
        let mut store = BaselineStore::new();
        let spiky = crate::stats::Summary {
            median: 0.0,
            mad: 0.01,
            min: 0.0,
            max: 0.0,
            samples: 10,
        };
        store.set_global(Baseline {
            ipc: spiky,
            branch_miss_rate: spiky,
            cache_miss_rate: spiky,
            l1d_mpki: spiky,
            itlb_mpki: spiky,
            dtlb_mpki: spiky,
        });
        let mut detector = AnomalyDetector::new(thresholds(), 0.0);

        let features = FeatureVector {
            wall_time: 0.0,
            ipc: 1.0,
            branch_miss_rate: 1.0,
            cache_miss_rate: 1.0,
            l1d_mpki: 1.0,
            itlb_mpki: 1.0,
            dtlb_mpki: 1.0,
        };

        let alerts = detector.detect(&store, "", &features, 0.0);
        let order: Vec<&str> = alerts.iter().map(|a| a.feature.as_str()).collect();
        assert_eq!(order, FEATURE_NAMES.to_vec());
    }

    #[test]
    fn safe_no_op_when_no_baseline_resolvable() {
        let store = BaselineStore::new();
        let mut detector = AnomalyDetector::new(thresholds(), 30.0);

        let alerts = detector.detect(&store, "matmul", &features_with_ipc(99.0), 0.0);
        assert!(alerts.is_empty());
    }
}
