use crate::{CommandSpec, ProcessHandle, ProcessLauncher, UsageSample};
use repograde_metrics::{OutputProtocol, PytestText};
use repograde_types::{SuiteResult, TestCounts, TIMEOUT_RETURNCODE};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SuperviseOptions {
    pub timeout: Duration,
    pub sample_interval: Duration,

    /// Time between the polite stop request and the forced kill.
    pub kill_grace: Duration,

    /// Upper bound on waiting for buffered output after the root exits.
    pub drain_window: Duration,

    /// Mirror of the combined output, written as it arrives.
    pub log_path: Option<PathBuf>,

    /// Structured metric line to pull out of the output (and log).
    pub metric_prefix: Option<String>,
}

impl SuperviseOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sample_interval: Duration::from_millis(100),
            kill_grace: Duration::from_secs(2),
            drain_window: Duration::from_secs(2),
            log_path: None,
            metric_prefix: None,
        }
    }

    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = Some(prefix.into());
        self
    }
}

/// What happened to one supervised process, before any interpretation of its output.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub returncode: i32,
    pub elapsed: Duration,
    pub timed_out: bool,
    pub output: String,
    pub samples: Vec<UsageSample>,
    pub launch_error: Option<String>,
}

impl ProcessOutcome {
    fn mean_of(&self, f: impl Fn(&UsageSample) -> f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(f).sum::<f64>() / self.samples.len() as f64
    }

    pub fn avg_memory_mb(&self) -> f64 {
        self.mean_of(UsageSample::rss_mb)
    }

    pub fn avg_cpu_percent(&self) -> f64 {
        self.mean_of(|s| s.cpu_percent)
    }
}

/// Incremental copy of a process's output on disk.
struct LogMirror {
    file: Option<File>,
    path: Option<PathBuf>,
}

impl LogMirror {
    fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self {
                file: None,
                path: None,
            };
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), %err, "cannot create log directory");
            }
        }
        let file = File::create(path)
            .map_err(|err| warn!(path = %path.display(), %err, "cannot open log file"))
            .ok();
        Self {
            file,
            path: Some(path.to_path_buf()),
        }
    }

    /// Read-only view of a log written by an earlier [`LogMirror::open`].
    fn open_existing(path: Option<&Path>) -> Self {
        Self {
            file: None,
            path: path.map(Path::to_path_buf),
        }
    }

    fn write(&mut self, chunk: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(err) = file.write_all(chunk.as_bytes()).and_then(|_| file.flush()) {
            warn!(%err, "log mirror write failed; continuing without it");
            self.file = None;
        }
    }

    fn read_back(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| std::fs::read(p).ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

/// Runs one command under a deadline while sampling its process tree.
pub struct Supervisor<L, P = PytestText> {
    launcher: L,
    protocol: P,
}

impl<L: ProcessLauncher> Supervisor<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            protocol: PytestText,
        }
    }
}

impl<L: ProcessLauncher, P: OutputProtocol> Supervisor<L, P> {
    pub fn with_protocol(launcher: L, protocol: P) -> Self {
        Self { launcher, protocol }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Run a test suite and interpret its output.
    ///
    /// Never fails: launch failures and timeouts come back as failed suites.
    pub fn run(&self, spec: &CommandSpec, opts: &SuperviseOptions) -> SuiteResult {
        let outcome = self.supervise(spec, opts);

        if let Some(err) = outcome.launch_error {
            return SuiteResult::launch_failure(err);
        }

        let counts = if outcome.timed_out {
            TestCounts::single_failure()
        } else {
            self.protocol.counts(&outcome.output)
        };

        let metrics = match opts.metric_prefix.as_deref() {
            Some(prefix) => {
                let log = LogMirror::open_existing(opts.log_path.as_deref()).read_back();
                self.protocol.metrics(&outcome.output, &log, prefix)
            }
            None => Default::default(),
        };

        let mut result = SuiteResult {
            counts,
            returncode: outcome.returncode,
            elapsed_s: outcome.elapsed.as_secs_f64(),
            avg_memory_mb: outcome.avg_memory_mb(),
            avg_cpu_percent: outcome.avg_cpu_percent(),
            metrics,
            timed_out: outcome.timed_out,
            output: outcome.output,
            error: None,
        };
        result.enforce_failure_floor();
        result
    }

    /// Launch, poll, sample and (if needed) kill; no output interpretation.
    pub fn supervise(&self, spec: &CommandSpec, opts: &SuperviseOptions) -> ProcessOutcome {
        if spec.argv.is_empty() {
            return ProcessOutcome {
                returncode: 1,
                launch_error: Some(crate::AdapterError::EmptyArgv.to_string()),
                ..Default::default()
            };
        }

        let mut log = LogMirror::open(opts.log_path.as_deref());
        let started = Instant::now();
        let deadline = started + opts.timeout;

        let mut handle = match self.launcher.launch(spec) {
            Ok(h) => h,
            Err(err) => {
                warn!(argv = ?spec.argv, %err, "launch failed");
                let msg = err.to_string();
                log.write(&format!("{msg}\n"));
                return ProcessOutcome {
                    returncode: 1,
                    elapsed: started.elapsed(),
                    launch_error: Some(msg),
                    ..Default::default()
                };
            }
        };
        debug!(argv = ?spec.argv, timeout = ?opts.timeout, "launched");

        let mut output = String::new();
        let mut samples = Vec::new();
        let mut take = |chunks: Vec<String>, output: &mut String| {
            for chunk in chunks {
                log.write(&chunk);
                output.push_str(&chunk);
            }
        };

        let exit = loop {
            match handle.poll() {
                Ok(Some(code)) => break Some(code),
                Ok(None) => {}
                Err(err) => {
                    warn!(%err, "lost track of child; treating as failed exit");
                    break Some(1);
                }
            }
            if Instant::now() >= deadline {
                break None;
            }

            take(handle.drain_available_output(), &mut output);
            if let Some(sample) = handle.sum_tree_usage() {
                samples.push(sample);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                std::thread::sleep(opts.sample_interval.min(remaining));
            }
        };

        match exit {
            Some(code) => {
                take(handle.drain_remaining_output(opts.drain_window), &mut output);
                let elapsed = started.elapsed();
                debug!(code, ?elapsed, samples = samples.len(), "exited");
                ProcessOutcome {
                    returncode: code,
                    elapsed,
                    timed_out: false,
                    output,
                    samples,
                    launch_error: None,
                }
            }
            None => {
                let elapsed = started.elapsed();
                take(handle.drain_available_output(), &mut output);
                handle.terminate_tree(opts.kill_grace);
                take(
                    handle.drain_remaining_output(opts.drain_window.min(Duration::from_millis(500))),
                    &mut output,
                );
                info!(argv = ?spec.argv, ?elapsed, "timed out; process tree terminated");
                ProcessOutcome {
                    returncode: TIMEOUT_RETURNCODE,
                    elapsed,
                    timed_out: true,
                    output,
                    samples,
                    launch_error: None,
                }
            }
        }
    }
}
