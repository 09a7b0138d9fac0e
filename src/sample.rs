//! The per-counter, per-interval datum produced by a Sample Source, and the
//! grouping logic that reassembles a flat stream of these into intervals.

use serde::{Deserialize, Serialize};

/// One observation of one counter during one sampling interval.
///
/// Samples whose raw value was reported as unsupported/not-counted/not-
/// available are dropped upstream by the Sample Source; this type only ever
/// carries values that were actually counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonically non-decreasing seconds from the Sample Source's clock.
    pub perf_time: f64,
    /// Seconds since the epoch.
    pub wall_time: f64,
    /// Short counter name, e.g. `"cycles"` or `"L1-dcache-load-misses"`.
    pub counter: String,
    pub value: u64,
    pub duration_ms: u32,
}

/// `perf_time` values within this tolerance belong to the same interval.
pub const INTERVAL_TOLERANCE_SECONDS: f64 = 0.001;

/// Intervals with fewer counters than this are discarded as unusable (§5).
const MIN_COUNTERS_PER_INTERVAL: usize = 3;

/// Reassembles a flat, possibly out-of-order-within-interval stream of
/// `Sample`s into per-interval groups, using `perf_time`-equality-within-
/// tolerance as the grouping key (the normative rule per §5 / Open Question
/// (a): tolerance-based grouping, not strict `num_events` chunking, since it
/// stays correct even when a counter was dropped for that interval).
///
/// A bounded number of open intervals is kept — at most `expected_events`
/// many groups open at once is the common case, but the grouper does not
/// hard-cap concurrently open groups; callers drive it with a stream that
/// arrives in non-decreasing `perf_time`, so in practice at most one group
/// is open at a time.
#[derive(Debug, Default)]
pub struct IntervalGrouper {
    open: Vec<(f64, Vec<Sample>)>,
}

impl IntervalGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample in. Returns any interval(s) that are now known to be
    /// closed (every open interval whose `perf_time` no longer matches this
    /// sample's, within tolerance).
    pub fn push(&mut self, sample: Sample) -> Vec<Vec<Sample>> {
        let mut closed = Vec::new();

        if let Some(idx) = self
            .open
            .iter()
            .position(|(t, _)| (t - sample.perf_time).abs() <= INTERVAL_TOLERANCE_SECONDS)
        {
            self.open[idx].1.push(sample);
        } else {
            // starting a new interval closes every interval strictly older
            // than it, since perf_time arrives non-decreasing.
            let mut still_open = Vec::new();
            for (t, samples) in self.open.drain(..) {
                if t < sample.perf_time - INTERVAL_TOLERANCE_SECONDS {
                    closed.push(samples);
                } else {
                    still_open.push((t, samples));
                }
            }
            self.open = still_open;
            let perf_time = sample.perf_time;
            self.open.push((perf_time, vec![sample]));
        }

        closed
            .into_iter()
            .filter(|samples| samples.len() >= MIN_COUNTERS_PER_INTERVAL)
            .collect()
    }

    /// Flush every still-open interval, e.g. at session end. Intervals below
    /// the minimum counter count are discarded, matching `push`.
    pub fn finish(mut self) -> Vec<Vec<Sample>> {
        self.open
            .drain(..)
            .map(|(_, samples)| samples)
            .filter(|samples| samples.len() >= MIN_COUNTERS_PER_INTERVAL)
            .collect()
    }
}

/// What a monitoring or collection session is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    SystemWide,
    Pid(u32),
    Executable(String),
}
