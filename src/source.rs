//! The Sample Source abstraction (§4.2, §9: "define a capability — iterator
//! of Sample records + close — so unit tests can drive the detector with
//! synthetic streams") and its canonical `perf stat` subprocess binding.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::sample::{Sample, Target};

/// What the core consumes: a bounded stream of `Sample`s plus an explicit
/// close. A session is successful if it produced at least one sample,
/// regardless of the underlying process's exit status (§4.2).
pub trait SampleSource {
    /// Block for the next sample, up to `deadline`. `Ok(None)` means the
    /// stream ended (or the deadline passed) without error.
    fn next_sample(&mut self, deadline: Instant) -> Result<Option<Sample>>;

    fn close(self: Box<Self>);
}

/// A pre-built, in-memory stream — used by tests, and by any caller that
/// already has samples from elsewhere.
pub struct SyntheticSource {
    samples: std::vec::IntoIter<Sample>,
}

impl SyntheticSource {
    pub fn new(samples: Vec<Sample>) -> Self {
        SyntheticSource {
            samples: samples.into_iter(),
        }
    }
}

impl SampleSource for SyntheticSource {
    fn next_sample(&mut self, _deadline: Instant) -> Result<Option<Sample>> {
        Ok(self.samples.next())
    }

    fn close(self: Box<Self>) {}
}

/// Parse one `perf stat -x ,` record: `perf_time,value,,counter,...`, with
/// the empty slot between value and counter name preserved (§6, §9). Lines
/// whose value is `<not supported>`, `<not counted>`, or similar are
/// dropped, not errors, matching "Samples whose raw value is unsupported...
/// are dropped by the Sample Source" (§4.2).
fn parse_perf_line(line: &str, wall_time: f64, duration_ms: u32) -> Option<Sample> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 4 {
        return None;
    }

    let perf_time: f64 = fields[0].trim().parse().ok()?;
    let raw_value = fields[1].trim();
    let counter = fields[3].trim();

    if counter.is_empty() {
        return None;
    }
    if raw_value.starts_with('<') {
        // "<not supported>", "<not counted>", ...
        return None;
    }

    let value: u64 = raw_value.parse().ok()?;

    Some(Sample {
        perf_time,
        wall_time,
        counter: counter.to_string(),
        value,
        duration_ms,
    })
}

/// Builds the canonical, informative `perf stat` command line from §6:
/// `perf stat --no-big-num -I <interval_ms> -x , -e <events> [-p <pid> |
/// <path> | -a]`.
pub fn build_perf_command(target: &Target, events: &[String], interval_ms: u32) -> Command {
    let mut cmd = Command::new("perf");
    cmd.arg("stat")
        .arg("--no-big-num")
        .arg("-I")
        .arg(interval_ms.to_string())
        .arg("-x")
        .arg(",")
        .arg("-e")
        .arg(events.join(","));

    match target {
        Target::SystemWide => {
            cmd.arg("-a");
        }
        Target::Pid(pid) => {
            cmd.arg("-p").arg(pid.to_string());
        }
        Target::Executable(path) => {
            cmd.arg(path);
        }
    }

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd
}

/// Reads a `perf stat` child process on a dedicated thread and forwards
/// parsed samples over a bounded channel, so the feature-engineering loop
/// never blocks directly on subprocess I/O (§5 ambient note).
pub struct PerfStatSource {
    child: Child,
    receiver: Receiver<Sample>,
    reader: Option<JoinHandle<()>>,
}

const CHANNEL_CAPACITY: usize = 4096;

impl PerfStatSource {
    pub fn spawn(target: Target, events: Vec<String>, interval_ms: u32) -> Result<Self> {
        let mut child = build_perf_command(&target, &events, interval_ms)
            .spawn()
            .map_err(|e| Error::SampleSourceFailure {
                inner: format!("failed to spawn perf: {}", e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::SampleSourceFailure {
            inner: "perf child had no stdout".to_string(),
        })?;

        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let reader = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("perf stdout read error: {}", e);
                        break;
                    }
                };

                let wall_time = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);

                match parse_perf_line(&line, wall_time, interval_ms) {
                    Some(sample) => {
                        if sender.send(sample).is_err() {
                            break;
                        }
                    }
                    None => debug!("skipped unparseable perf record: {:?}", line),
                }
            }
        });

        Ok(PerfStatSource {
            child,
            receiver,
            reader: Some(reader),
        })
    }
}

impl SampleSource for PerfStatSource {
    /// Races the channel receive against `deadline` rather than trusting the
    /// child's exit status, which is not meaningful under an external
    /// timeout wrapper (§4.2, §9 "cancellation is cooperative").
    fn next_sample(&mut self, deadline: Instant) -> Result<Option<Sample>> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        match self.receiver.recv_timeout(deadline - now) {
            Ok(sample) => Ok(Some(sample)),
            Err(_) => Ok(None),
        }
    }

    fn close(mut self: Box<Self>) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Drains a source until `deadline`, returning every sample delivered.
/// Matches "partial samples already delivered are consumed" on deadline
/// expiry (§5).
pub fn drain_until(source: &mut dyn SampleSource, deadline: Instant) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    loop {
        match source.next_sample(deadline)? {
            Some(sample) => samples.push(sample),
            None => break,
        }
        if Instant::now() >= deadline {
            break;
        }
    }
    Ok(samples)
}

/// A deadline `duration` from now.
pub fn deadline_after(duration: Duration) -> Instant {
    Instant::now() + duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_canonical_record_preserving_empty_field() {
        let sample = parse_perf_line("1.000123456,10000000,,cycles,100.00", 0.0, 200)
            .expect("valid record");
        assert_eq!(sample.perf_time, 1.000123456);
        assert_eq!(sample.counter, "cycles");
        assert_eq!(sample.value, 10_000_000);
    }

    #[test]
    fn drops_unsupported_counters() {
        assert!(parse_perf_line("1.0,<not supported>,,cache-misses", 0.0, 200).is_none());
        assert!(parse_perf_line("1.0,<not counted>,,cache-misses", 0.0, 200).is_none());
    }

    #[test]
    fn drops_malformed_lines_without_panicking() {
        assert!(parse_perf_line("not,a,valid,record,at,all", 0.0, 200).is_none());
        assert!(parse_perf_line("", 0.0, 200).is_none());
        assert!(parse_perf_line("1.0,100", 0.0, 200).is_none());
    }

    #[test]
    fn synthetic_source_replays_in_order() {
        let samples = vec![
            Sample {
                perf_time: 1.0,
                wall_time: 0.0,
                counter: "cycles".to_string(),
                value: 1,
                duration_ms: 200,
            },
            Sample {
                perf_time: 1.0,
                wall_time: 0.0,
                counter: "instructions".to_string(),
                value: 2,
                duration_ms: 200,
            },
        ];

        let mut source = SyntheticSource::new(samples);
        let deadline = deadline_after(Duration::from_millis(10));
        let drained = drain_until(&mut source, deadline).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].counter, "cycles");
    }

    #[test]
    fn builds_system_wide_command_line() {
        let cmd = build_perf_command(&Target::SystemWide, &["cycles".to_string()], 200);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"-a".to_string()));
        assert!(args.contains(&"200".to_string()));
    }

    #[test]
    fn builds_pid_command_line() {
        let cmd = build_perf_command(&Target::Pid(1234), &["cycles".to_string()], 200);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"-p".to_string()));
        assert!(args.contains(&"1234".to_string()));
    }
}
