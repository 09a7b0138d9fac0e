//! In-memory baseline state: one fully-populated set of per-feature
//! statistics, and the store that resolves an application name to the
//! baseline the Anomaly Detector should score it against (§4.4).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::Error;
use crate::profile::Profile;
use crate::stats::Summary;

/// Six per-feature summaries, always fully populated — a baseline with a
/// missing feature is not representable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub ipc: Summary,
    pub branch_miss_rate: Summary,
    pub cache_miss_rate: Summary,
    pub l1d_mpki: Summary,
    pub itlb_mpki: Summary,
    pub dtlb_mpki: Summary,
}

impl Baseline {
    pub fn get(&self, feature: &str) -> Option<Summary> {
        match feature {
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

/// Which baseline a detection was actually scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineKind {
    Global,
    PerApplication,
}

/// One application's profiling record. `baseline` is `None` for a known
/// application that was never successfully profiled — distinct from the
/// application being entirely unknown to the store.
#[derive(Debug, Clone)]
pub struct AppBaselineRecord {
    pub name: String,
    baseline: Option<Baseline>,
}

impl AppBaselineRecord {
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }
}

/// Holds the global baseline plus every known per-application baseline, and
/// implements the `resolve` lookup contract used by the Anomaly Detector.
#[derive(Debug, Default)]
pub struct BaselineStore {
    global: Option<Baseline>,
    apps: HashMap<String, AppBaselineRecord>,
}

/// Canonical filename for the system-wide baseline, relative to a baseline
/// directory.
pub const GLOBAL_BASELINE_FILE: &str = "rigorous_baseline.json";

fn app_baseline_filename(app_name: &str) -> String {
    format!("baseline_{}.json", app_name)
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover and load every baseline under `baseline_directory`: the
    /// global baseline at `rigorous_baseline.json`, and one per-application
    /// baseline for each `baseline_<name>.json` file found alongside it.
    /// A missing directory yields an empty (but functional) store; a
    /// malformed individual file is logged and skipped rather than failing
    /// the whole load.
    pub fn load(baseline_directory: impl AsRef<Path>) -> Self {
        let dir = baseline_directory.as_ref();
        let mut store = BaselineStore::new();

        let global_path = dir.join(GLOBAL_BASELINE_FILE);
        if global_path.exists() {
            match read_profile(&global_path) {
                Ok(profile) => store.global = Some(profile.baseline()),
                Err(e) => warn!("global baseline {} unreadable: {}", global_path.display(), e),
            }
        } else {
            warn!(
                "{}",
                Error::BaselineMissing {
                    what: "global".to_string(),
                    inner: format!("{} not found", global_path.display()),
                }
            );
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return store,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name == GLOBAL_BASELINE_FILE {
                continue;
            }
            let Some(app_name) = file_name
                .strip_prefix("baseline_")
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };

            match read_profile(&path) {
                Ok(profile) => {
                    store.apps.insert(
                        app_name.to_string(),
                        AppBaselineRecord {
                            name: app_name.to_string(),
                            baseline: Some(profile.baseline()),
                        },
                    );
                }
                Err(e) => warn!("baseline {} unreadable: {}", path.display(), e),
            }
        }

        store
    }

    pub fn set_global(&mut self, baseline: Baseline) {
        self.global = Some(baseline);
    }

    pub fn set_app(&mut self, app_name: impl Into<String>, baseline: Baseline) {
        let name = app_name.into();
        self.apps.insert(
            name.clone(),
            AppBaselineRecord {
                name,
                baseline: Some(baseline),
            },
        );
    }

    pub fn has_global(&self) -> bool {
        self.global.is_some()
    }

    pub fn app_record(&self, app_name: &str) -> Option<&AppBaselineRecord> {
        self.apps.get(app_name)
    }

    /// Resolve the baseline to score `app_name` against: the per-application
    /// baseline if `app_name` is non-empty and a usable record exists,
    /// otherwise the global baseline. Returns `None` if neither is
    /// available — the detector then has nothing to score against and must
    /// treat the interval as a no-op (§4.4, §4.5).
    pub fn resolve(&self, app_name: &str) -> Option<(BaselineKind, &Baseline)> {
        if !app_name.is_empty() {
            match self.apps.get(app_name).and_then(|record| record.baseline()) {
                Some(baseline) => return Some((BaselineKind::PerApplication, baseline)),
                None => warn!(
                    "{}",
                    Error::BaselineMissing {
                        what: app_name.to_string(),
                        inner: "no per-application baseline, falling back to global".to_string(),
                    }
                ),
            }
        }
        self.global
            .as_ref()
            .map(|b| (BaselineKind::Global, b))
    }

    pub fn app_profile_path(baseline_directory: impl AsRef<Path>, app_name: &str) -> PathBuf {
        baseline_directory.as_ref().join(app_baseline_filename(app_name))
    }

    pub fn global_profile_path(baseline_directory: impl AsRef<Path>) -> PathBuf {
        baseline_directory.as_ref().join(GLOBAL_BASELINE_FILE)
    }
}

fn read_profile(path: &Path) -> crate::error::Result<Profile> {
    let text = fs::read_to_string(path)?;
    Ok(Profile::from_json(&text)?)
}
