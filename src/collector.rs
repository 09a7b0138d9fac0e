//! Orchestrates repeated executions of a target application through a
//! Sample Source, accumulates feature vectors, and derives + persists a
//! Baseline (§4.5).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};

use crate::baseline::{Baseline, BaselineStore};
use crate::error::{Error, Result};
use crate::features::engineer_features;
use crate::profile::{Profile, ProfileMetadata};
use crate::sample::{IntervalGrouper, Target};
use crate::source::{deadline_after, drain_until, PerfStatSource, SampleSource};
use crate::stats::summary;

/// Upper bound on accumulated feature vectors per application, preserved as
/// a defensive cap rather than a fixed-capacity array (§9).
pub const MAX_SAMPLES: usize = 100_000;

pub struct BaselineCollector {
    app_directory: PathBuf,
    baseline_directory: PathBuf,
    events: Vec<String>,
    sampling_interval_ms: u32,
    runs_per_app: u32,
    min_samples_per_app: usize,
    max_runtime_seconds: u64,
    core_affinity: i64,
}

impl BaselineCollector {
    pub fn new(
        app_directory: impl Into<PathBuf>,
        baseline_directory: impl Into<PathBuf>,
        events: Vec<String>,
        sampling_interval_ms: u32,
        runs_per_app: u32,
        min_samples_per_app: u32,
        max_runtime_seconds: u32,
        core_affinity: i64,
    ) -> Self {
        BaselineCollector {
            app_directory: app_directory.into(),
            baseline_directory: baseline_directory.into(),
            events,
            sampling_interval_ms,
            runs_per_app,
            min_samples_per_app: min_samples_per_app as usize,
            max_runtime_seconds: max_runtime_seconds as u64,
            core_affinity,
        }
    }

    fn executable_path(&self, app_name: &str) -> Result<PathBuf> {
        let path = self.app_directory.join(app_name);
        if !is_executable_file(&path) {
            return Err(Error::AppNotExecutable {
                path: path.display().to_string(),
            });
        }
        Ok(path)
    }

    /// Runs one collection pass against the perf-backed Sample Source.
    fn run_once(&self, path: &Path) -> Result<Vec<crate::features::FeatureVector>> {
        let mut source = PerfStatSource::spawn(
            Target::Executable(path.display().to_string()),
            self.events.clone(),
            self.sampling_interval_ms,
        )?;

        let deadline = deadline_after(Duration::from_secs(self.max_runtime_seconds));
        let samples = drain_until(&mut source, deadline)?;
        Box::new(source).close();

        Ok(group_and_engineer(samples))
    }

    /// Collects a baseline for `app_name` and persists it via the Baseline
    /// Store (§4.5 steps 1-5).
    pub fn collect(&self, app_name: &str, store: &mut BaselineStore) -> Result<Baseline> {
        let path = self.executable_path(app_name)?;

        let mut features = Vec::new();
        for run in 0..self.runs_per_app {
            match self.run_once(&path) {
                Ok(vectors) => {
                    for v in vectors {
                        if features.len() < MAX_SAMPLES {
                            features.push(v);
                        }
                    }
                }
                Err(e) => warn!("run {} of {} failed, skipping: {}", run, app_name, e),
            }
        }

        if features.len() < self.min_samples_per_app {
            return Err(Error::InsufficientSamples {
                app: app_name.to_string(),
                collected: features.len(),
                required: self.min_samples_per_app,
            });
        }

        let baseline = build_baseline(&features);

        let metadata = ProfileMetadata {
            application_name: app_name.to_string(),
            collection_timestamp: Utc::now(),
            runs_executed: self.runs_per_app,
            samples_collected: features.len(),
            events: self.events.clone(),
            sampling_interval_ms: self.sampling_interval_ms,
            core_affinity: self.core_affinity,
        };

        self.persist(app_name, &baseline, metadata)?;
        store.set_app(app_name, baseline);

        Ok(baseline)
    }

    fn persist(&self, app_name: &str, baseline: &Baseline, metadata: ProfileMetadata) -> Result<()> {
        fs::create_dir_all(&self.baseline_directory)?;
        let path = BaselineStore::app_profile_path(&self.baseline_directory, app_name);
        let profile = Profile::new(baseline, metadata);
        let text = profile.to_json_pretty().map_err(|e| Error::ProfilePersistenceError {
            path: path.display().to_string(),
            inner: e.to_string(),
        })?;

        // Write to a temp file first so a failure partway through never
        // leaves a partial profile behind (§7: "partial files must not be
        // left behind").
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, text).map_err(|e| Error::ProfilePersistenceError {
            path: path.display().to_string(),
            inner: e.to_string(),
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| Error::ProfilePersistenceError {
            path: path.display().to_string(),
            inner: e.to_string(),
        })?;

        info!("persisted baseline for {} to {}", app_name, path.display());
        Ok(())
    }

    /// Enumerates regular, executable files in the application directory and
    /// collects each; per-app failures are reported but do not abort the
    /// batch (§4.5).
    pub fn collect_all(&self, store: &mut BaselineStore) -> Result<usize> {
        let entries = fs::read_dir(&self.app_directory)?;
        let mut successes = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            if !is_executable_file(&path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            match self.collect(name, store) {
                Ok(_) => successes += 1,
                Err(e) => warn!("collection for {} failed: {}", name, e),
            }
        }

        Ok(successes)
    }
}

fn group_and_engineer(samples: Vec<crate::sample::Sample>) -> Vec<crate::features::FeatureVector> {
    let mut grouper = IntervalGrouper::new();
    let mut intervals = Vec::new();

    for sample in samples {
        intervals.extend(grouper.push(sample));
    }
    intervals.extend(grouper.finish());

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    intervals
        .into_iter()
        .filter_map(|interval| engineer_features(&interval, now).ok())
        .collect()
}

fn build_baseline(features: &[crate::features::FeatureVector]) -> Baseline {
    let column = |f: fn(&crate::features::FeatureVector) -> f64| -> Vec<f64> {
        features.iter().map(f).collect()
    };

    let (ipc, _) = summary(&column(|f| f.ipc));
    let (branch_miss_rate, _) = summary(&column(|f| f.branch_miss_rate));
    let (cache_miss_rate, _) = summary(&column(|f| f.cache_miss_rate));
    let (l1d_mpki, _) = summary(&column(|f| f.l1d_mpki));
    let (itlb_mpki, _) = summary(&column(|f| f.itlb_mpki));
    let (dtlb_mpki, _) = summary(&column(|f| f.dtlb_mpki));

    Baseline {
        ipc,
        branch_miss_rate,
        cache_miss_rate,
        l1d_mpki,
        itlb_mpki,
        dtlb_mpki,
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
