//! Robust, non-parametric point statistics over a finite sample of reals.
//!
//! HPC counter ratios across real workloads have heavy tails and transient
//! spikes; an M-estimator built on median/MAD resists contamination up to
//! 50% and keeps training-set outliers from desensitizing the detector the
//! way a mean/std-dev estimator would.

use failure::Fail;
use serde::{Deserialize, Serialize};

/// Floor applied to MAD before it is used as a divisor, so a degenerate
/// (constant) baseline doesn't produce an infinite or NaN z-score.
pub const EPSILON: f64 = 1e-9;

/// Summary statistics for one scalar feature's sample set.
///
/// Invariants: `samples >= 1` when derived from a non-empty input, `mad >=
/// 0.0`, and `min <= median <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub median: f64,
    pub mad: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

impl Summary {
    fn empty() -> Self {
        Summary {
            median: 0.0,
            mad: 0.0,
            min: 0.0,
            max: 0.0,
            samples: 0,
        }
    }
}

/// The sample set was empty where at least one value was required.
#[derive(Debug, Fail)]
#[fail(display = "insufficient samples to compute a statistic")]
pub struct InsufficientSamples;

/// Median of `xs`. Callers guarantee every value is finite; NaN input is a
/// programming error, not something this function filters.
///
/// Returns `0.0` for an empty slice.
pub fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }

    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite, comparable sample"));

    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median absolute deviation of `xs` around `center`.
pub fn mad(xs: &[f64], center: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }

    let deviations: Vec<f64> = xs.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Robust z-score: `(v - center) / max(scale, EPSILON)`.
pub fn robust_z(value: f64, center: f64, scale: f64) -> f64 {
    (value - center) / scale.max(EPSILON)
}

/// Full summary statistics over `xs`. Fails with `InsufficientSamples` for an
/// empty input, still returning a well-defined all-zero `Summary`.
pub fn summary(xs: &[f64]) -> (Summary, ::std::result::Result<(), InsufficientSamples>) {
    if xs.is_empty() {
        return (Summary::empty(), Err(InsufficientSamples));
    }

    let med = median(xs);
    let deviation = mad(xs, med);

    let mut min = xs[0];
    let mut max = xs[0];
    for &v in &xs[1..] {
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }

    (
        Summary {
            median: med,
            mad: deviation,
            min,
            max,
            samples: xs.len(),
        },
        Ok(()),
    )
}
