//! Reduces one interval's worth of `Sample`s to a fixed-shape `FeatureVector`.

use failure::Fail;
use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// One behavioral summary of one interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub wall_time: f64,
    pub ipc: f64,
    pub branch_miss_rate: f64,
    pub cache_miss_rate: f64,
    pub l1d_mpki: f64,
    pub itlb_mpki: f64,
    pub dtlb_mpki: f64,
}

/// The six scalar components of a `FeatureVector`, in the fixed order used
/// throughout the detector and baseline (ipc, branch_miss_rate,
/// cache_miss_rate, l1d_mpki, itlb_mpki, dtlb_mpki).
pub const FEATURE_NAMES: [&str; 6] = [
    "ipc",
    "branch_miss_rate",
    "cache_miss_rate",
    "l1d_mpki",
    "itlb_mpki",
    "dtlb_mpki",
];

impl FeatureVector {
    /// The six scalar components, in `FEATURE_NAMES` order.
    pub fn components(&self) -> [f64; 6] {
        [
            self.ipc,
            self.branch_miss_rate,
            self.cache_miss_rate,
            self.l1d_mpki,
            self.itlb_mpki,
            self.dtlb_mpki,
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "ipc" => Some(self.ipc),
            "branch_miss_rate" => Some(self.branch_miss_rate),
            "cache_miss_rate" => Some(self.cache_miss_rate),
            "l1d_mpki" => Some(self.l1d_mpki),
            "itlb_mpki" => Some(self.itlb_mpki),
            "dtlb_mpki" => Some(self.dtlb_mpki),
            _ => None,
        }
    }
}

/// The interval is missing `cycles` and/or `instructions`, without which IPC
/// (and therefore the whole feature vector) cannot be derived.
#[derive(Debug, Fail)]
#[fail(display = "missing essential counters (cycles and/or instructions)")]
pub struct MissingEssentials;

#[derive(Default)]
struct Counters {
    cycles: Option<u64>,
    instructions: Option<u64>,
    branches: Option<u64>,
    branch_misses: Option<u64>,
    cache_references: Option<u64>,
    cache_misses: Option<u64>,
    l1d_misses: Option<u64>,
    itlb_misses: Option<u64>,
    dtlb_misses: Option<u64>,
}

/// Derive a `FeatureVector` from one interval's `Sample`s. Captures the
/// *first* occurrence of each recognized counter name; unrecognized counters
/// are ignored for forward-compatibility. `wall_time` is stamped from
/// `now`, matching "stamped from the local clock at derivation time" (§4.3)
/// — callers pass in a clock reading rather than this module reaching for
/// one itself, so tests stay deterministic.
pub fn engineer_features(
    samples: &[Sample],
    now_wall_time: f64,
) -> Result<FeatureVector, MissingEssentials> {
    let mut counters = Counters::default();

    for sample in samples {
        match sample.counter.as_str() {
            "cycles" if counters.cycles.is_none() => counters.cycles = Some(sample.value),
            "instructions" if counters.instructions.is_none() => {
                counters.instructions = Some(sample.value)
            }
            "branches" if counters.branches.is_none() => counters.branches = Some(sample.value),
            "branch-misses" if counters.branch_misses.is_none() => {
                counters.branch_misses = Some(sample.value)
            }
            "cache-references" if counters.cache_references.is_none() => {
                counters.cache_references = Some(sample.value)
            }
            "cache-misses" if counters.cache_misses.is_none() => {
                counters.cache_misses = Some(sample.value)
            }
            "L1-dcache-load-misses" if counters.l1d_misses.is_none() => {
                counters.l1d_misses = Some(sample.value)
            }
            "iTLB-load-misses" if counters.itlb_misses.is_none() => {
                counters.itlb_misses = Some(sample.value)
            }
            "dTLB-load-misses" if counters.dtlb_misses.is_none() => {
                counters.dtlb_misses = Some(sample.value)
            }
            _ => {}
        }
    }

    let cycles = counters.cycles.unwrap_or(0);
    let instructions = counters.instructions.unwrap_or(0);

    if cycles == 0 || instructions == 0 {
        return Err(MissingEssentials);
    }

    let branches = counters.branches.unwrap_or(0);
    let branch_misses = counters.branch_misses.unwrap_or(0);
    let cache_references = counters.cache_references.unwrap_or(0);
    let cache_misses = counters.cache_misses.unwrap_or(0);
    let l1d_misses = counters.l1d_misses.unwrap_or(0);
    let itlb_misses = counters.itlb_misses.unwrap_or(0);
    let dtlb_misses = counters.dtlb_misses.unwrap_or(0);

    let branch_miss_rate = if branches > 0 {
        branch_misses as f64 / branches as f64
    } else {
        0.0
    };

    let cache_miss_rate = if cache_references > 0 {
        cache_misses as f64 / cache_references as f64
    } else {
        0.0
    };

    let instructions_k = instructions as f64 / 1000.0;

    Ok(FeatureVector {
        wall_time: now_wall_time,
        ipc: instructions as f64 / cycles as f64,
        branch_miss_rate,
        cache_miss_rate,
        l1d_mpki: l1d_misses as f64 / instructions_k,
        itlb_mpki: itlb_misses as f64 / instructions_k,
        dtlb_mpki: dtlb_misses as f64 / instructions_k,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(counter: &str, value: u64) -> Sample {
        Sample {
            perf_time: 1.0,
            wall_time: 0.0,
            counter: counter.to_string(),
            value,
            duration_ms: 200,
        }
    }

    #[test]
    fn scenario_feature_derivation() {
        // spec.md §8 scenario 3
        let samples = vec![
            sample("cycles", 10_000_000),
            sample("instructions", 20_000_000),
            sample("branches", 1_000_000),
            sample("branch-misses", 10_000),
            sample("cache-references", 100_000),
            sample("cache-misses", 5_000),
            sample("L1-dcache-load-misses", 40_000),
            sample("iTLB-load-misses", 200),
            sample("dTLB-load-misses", 400),
        ];

        let features = engineer_features(&samples, 42.0).expect("complete interval");

        assert_eq!(features.ipc, 2.0);
        assert_eq!(features.branch_miss_rate, 0.01);
        assert_eq!(features.cache_miss_rate, 0.05);
        assert_eq!(features.l1d_mpki, 2.0);
        assert_eq!(features.itlb_mpki, 0.01);
        assert_eq!(features.dtlb_mpki, 0.02);
        assert_eq!(features.wall_time, 42.0);
    }

    #[test]
    fn missing_cycles_or_instructions_is_fatal() {
        let samples = vec![sample("instructions", 1_000)];
        assert!(engineer_features(&samples, 0.0).is_err());

        let samples = vec![sample("cycles", 1_000)];
        assert!(engineer_features(&samples, 0.0).is_err());
    }

    #[test]
    fn zero_denominators_yield_zero_ratios_not_errors() {
        let samples = vec![sample("cycles", 1_000), sample("instructions", 2_000)];
        let features = engineer_features(&samples, 0.0).expect("essentials present");

        assert_eq!(features.branch_miss_rate, 0.0);
        assert_eq!(features.cache_miss_rate, 0.0);
        assert_eq!(features.l1d_mpki, 0.0);
        assert_eq!(features.itlb_mpki, 0.0);
        assert_eq!(features.dtlb_mpki, 0.0);
    }

    #[test]
    fn first_occurrence_wins_and_unknown_counters_are_ignored() {
        let samples = vec![
            sample("cycles", 1_000),
            sample("cycles", 999_999), // duplicate, ignored
            sample("instructions", 2_000),
            sample("some-future-counter", 7),
        ];

        let features = engineer_features(&samples, 0.0).expect("essentials present");
        assert_eq!(features.ipc, 2.0);
    }

    #[test]
    fn invariant_ratios_in_range_for_positive_essentials() {
        let samples = vec![
            sample("cycles", 500),
            sample("instructions", 1_500),
            sample("branches", 100),
            sample("branch-misses", 100),
            sample("cache-references", 50),
            sample("cache-misses", 50),
        ];

        let features = engineer_features(&samples, 0.0).unwrap();
        assert!(features.ipc > 0.0);
        assert!((0.0..=1.0).contains(&features.branch_miss_rate));
        assert!((0.0..=1.0).contains(&features.cache_miss_rate));
        assert!(features.l1d_mpki >= 0.0);
        assert!(features.itlb_mpki >= 0.0);
        assert!(features.dtlb_mpki >= 0.0);
    }
}
