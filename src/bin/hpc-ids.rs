//! CLI entry point. Wires `Config`, `BaselineStore`, `AnomalyDetector` /
//! `BaselineCollector`, and the canonical `PerfStatSource` together behind
//! the session-mode contract of §6. Argument parsing mechanics are not
//! specified; the resulting modes, mutual exclusions, and exit codes are.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use hpc_ids::alert_sink::{AlertSink, JsonlFileAlertSink};
use hpc_ids::baseline::BaselineStore;
use hpc_ids::collector::BaselineCollector;
use hpc_ids::config::Config;
use hpc_ids::detector::{AnomalyDetector, Thresholds};
use hpc_ids::features::engineer_features;
use hpc_ids::sample::{IntervalGrouper, Target};
use hpc_ids::source::{deadline_after, PerfStatSource, SampleSource};

#[derive(Parser, Debug)]
#[command(name = "hpc-ids", about = "Host-based HPC intrusion/anomaly detector")]
struct Cli {
    /// Monitor a live target. System-wide unless --pid or --app-name is given.
    #[arg(long, conflicts_with_all = ["collect_app", "collect_all"])]
    monitor: bool,

    /// Attach to a running process id (monitor modes only).
    #[arg(long, conflicts_with = "app_name")]
    pid: Option<u32>,

    /// Attach by application basename (monitor or collect-app).
    #[arg(long = "app-name")]
    app_name: Option<String>,

    /// Monitoring session duration in seconds. Defaults to the configured
    /// `max_runtime_seconds`.
    #[arg(long)]
    duration: Option<u64>,

    /// Path to the JSON configuration file.
    #[arg(long, default_value = "hpc_ids.json")]
    config: PathBuf,

    /// Collect a baseline for one application.
    #[arg(long = "collect-app", conflicts_with = "collect_all")]
    collect_app: Option<String>,

    /// Collect baselines for every executable in the application directory.
    #[arg(long = "collect-all")]
    collect_all: bool,
}

enum SessionMode {
    MonitorSystem,
    MonitorPid(u32),
    MonitorApp(String),
    CollectApp(String),
    CollectAll,
}

fn resolve_mode(cli: &Cli) -> Result<SessionMode, String> {
    if let Some(app) = &cli.collect_app {
        return Ok(SessionMode::CollectApp(app.clone()));
    }
    if cli.collect_all {
        return Ok(SessionMode::CollectAll);
    }
    if !cli.monitor {
        return Err("one of --monitor, --collect-app, or --collect-all is required".to_string());
    }
    match (&cli.pid, &cli.app_name) {
        (Some(pid), None) => Ok(SessionMode::MonitorPid(*pid)),
        (None, Some(app)) => Ok(SessionMode::MonitorApp(app.clone())),
        (None, None) => Ok(SessionMode::MonitorSystem),
        (Some(_), Some(_)) => unreachable!("clap rejects --pid with --app-name"),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mode = match resolve_mode(&cli) {
        Ok(mode) => mode,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = Config::load(&cli.config);

    match mode {
        SessionMode::CollectApp(app) => run_collect_app(&config, &app),
        SessionMode::CollectAll => run_collect_all(&config),
        SessionMode::MonitorSystem => run_monitor(&config, &cli, Target::SystemWide, ""),
        SessionMode::MonitorPid(pid) => {
            run_monitor(&config, &cli, Target::Pid(pid), "")
        }
        SessionMode::MonitorApp(app) => {
            let path = PathBuf::from(&config.app_directory)
                .join(&app)
                .to_string_lossy()
                .into_owned();
            run_monitor(&config, &cli, Target::Executable(path), &app)
        }
    }
}

fn run_collect_app(config: &Config, app: &str) -> ExitCode {
    let collector = make_collector(config);
    let mut store = BaselineStore::load(&config.baseline_directory);

    match collector.collect(app, &mut store) {
        Ok(_) => {
            info!("collected baseline for {}", app);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("collection failed for {}: {}", app, e);
            ExitCode::FAILURE
        }
    }
}

fn run_collect_all(config: &Config) -> ExitCode {
    let collector = make_collector(config);
    let mut store = BaselineStore::load(&config.baseline_directory);

    match collector.collect_all(&mut store) {
        Ok(count) if count > 0 => {
            info!("collected {} baseline(s)", count);
            ExitCode::SUCCESS
        }
        Ok(_) => {
            error!("no baselines were collected");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("batch collection failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn make_collector(config: &Config) -> BaselineCollector {
    BaselineCollector::new(
        config.app_directory.clone(),
        config.baseline_directory.clone(),
        config.perf_events.clone(),
        config.sampling_interval_ms,
        config.runs_per_app,
        config.min_samples_per_app,
        config.max_runtime_seconds,
        config.core_affinity,
    )
}

fn run_monitor(config: &Config, cli: &Cli, target: Target, app_name: &str) -> ExitCode {
    let store = BaselineStore::load(&config.baseline_directory);

    let mut source = match PerfStatSource::spawn(
        target,
        config.perf_events.clone(),
        config.sampling_interval_ms,
    ) {
        Ok(source) => source,
        Err(e) => {
            error!("could not start sample source: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let duration = cli
        .duration
        .unwrap_or(config.max_runtime_seconds as u64);
    let deadline = deadline_after(Duration::from_secs(duration));

    let thresholds = Thresholds {
        medium: config.robust_z_threshold_medium,
        high: config.robust_z_threshold_high,
        critical: config.robust_z_threshold_critical,
    };
    let mut detector = AnomalyDetector::new(thresholds, config.alert_cooldown_seconds as f64);
    let mut sink = JsonlFileAlertSink::new(config.alert_output_file.clone());
    let mut grouper = IntervalGrouper::new();

    let mut delivered_any = false;
    loop {
        match source.next_sample(deadline) {
            Ok(Some(sample)) => {
                delivered_any = true;
                for interval in grouper.push(sample) {
                    handle_interval(&interval, &store, &mut detector, &mut sink, app_name);
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("sample source error: {}", e);
                break;
            }
        }
        if std::time::Instant::now() >= deadline {
            break;
        }
    }

    for interval in grouper.finish() {
        handle_interval(&interval, &store, &mut detector, &mut sink, app_name);
    }

    Box::new(source).close();

    if delivered_any {
        ExitCode::SUCCESS
    } else {
        error!("sample source produced no samples");
        ExitCode::FAILURE
    }
}

fn handle_interval(
    interval: &[hpc_ids::sample::Sample],
    store: &BaselineStore,
    detector: &mut AnomalyDetector,
    sink: &mut dyn AlertSink,
    app_name: &str,
) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    let features = match engineer_features(interval, now) {
        Ok(features) => features,
        Err(_) => return,
    };

    for alert in detector.detect(store, app_name, &features, now) {
        if let Err(e) = sink.record(&alert) {
            error!("failed to record alert: {}", e);
        }
    }
}
