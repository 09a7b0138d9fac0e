//! The on-disk baseline profile format: metadata plus six per-feature
//! summary statistics, serialized as JSON with full `f64` precision so a
//! round-trip reproduces every number (§4.4, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::Baseline;
use crate::stats::Summary;

/// `method` recorded against every feature's statistics.
pub const METHOD_ROBUST_MEDIAN_MAD: &str = "robust_median_mad";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub application_name: String,
    pub collection_timestamp: DateTime<Utc>,
    pub runs_executed: u32,
    pub samples_collected: usize,
    pub events: Vec<String>,
    pub sampling_interval_ms: u32,
    pub core_affinity: i64,
}

/// One feature's statistics as written to disk: a `Summary` plus the fixed
/// `method` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProfile {
    pub median: f64,
    pub mad: f64,
    pub method: String,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

impl From<Summary> for FeatureProfile {
    fn from(s: Summary) -> Self {
        FeatureProfile {
            median: s.median,
            mad: s.mad,
            method: METHOD_ROBUST_MEDIAN_MAD.to_string(),
            min: s.min,
            max: s.max,
            samples: s.samples,
        }
    }
}

impl From<FeatureProfile> for Summary {
    fn from(p: FeatureProfile) -> Self {
        Summary {
            median: p.median,
            mad: p.mad,
            min: p.min,
            max: p.max,
            samples: p.samples,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStatistics {
    pub ipc: FeatureProfile,
    pub branch_miss_rate: FeatureProfile,
    pub cache_miss_rate: FeatureProfile,
    pub l1d_mpki: FeatureProfile,
    pub itlb_mpki: FeatureProfile,
    pub dtlb_mpki: FeatureProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub metadata: ProfileMetadata,
    pub baseline_statistics: BaselineStatistics,
}

impl Profile {
    pub fn new(baseline: &Baseline, metadata: ProfileMetadata) -> Self {
        Profile {
            metadata,
            baseline_statistics: BaselineStatistics {
                ipc: baseline.ipc.into(),
                branch_miss_rate: baseline.branch_miss_rate.into(),
                cache_miss_rate: baseline.cache_miss_rate.into(),
                l1d_mpki: baseline.l1d_mpki.into(),
                itlb_mpki: baseline.itlb_mpki.into(),
                dtlb_mpki: baseline.dtlb_mpki.into(),
            },
        }
    }

    pub fn baseline(&self) -> Baseline {
        Baseline {
            ipc: self.baseline_statistics.ipc.clone().into(),
            branch_miss_rate: self.baseline_statistics.branch_miss_rate.clone().into(),
            cache_miss_rate: self.baseline_statistics.cache_miss_rate.clone().into(),
            l1d_mpki: self.baseline_statistics.l1d_mpki.clone().into(),
            itlb_mpki: self.baseline_statistics.itlb_mpki.clone().into(),
            dtlb_mpki: self.baseline_statistics.dtlb_mpki.clone().into(),
        }
    }

    /// Serialize with at least 15 significant decimals so re-reading
    /// reconstructs every statistic losslessly (§4.4). `serde_json` already
    /// round-trips `f64` exactly via the shortest-round-trippable
    /// representation, so a plain pretty-printed encoding satisfies this.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
