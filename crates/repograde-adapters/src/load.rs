//! Background CPU load for noise-sensitivity runs.

use crate::AdapterError;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Starts a set of background workers that compete for CPU with the measured suites.
pub trait LoadGenerator {
    /// Start `workers` workers that each stop on their own after `lifetime`.
    fn start(&self, workers: u32, lifetime: Duration) -> Result<LoadSession, AdapterError>;
}

impl<G: LoadGenerator> LoadGenerator for &G {
    fn start(&self, workers: u32, lifetime: Duration) -> Result<LoadSession, AdapterError> {
        (**self).start(workers, lifetime)
    }
}

/// Running load workers. Dropping the session stops them.
#[derive(Debug)]
pub struct LoadSession {
    children: Vec<Child>,
    grace: Duration,
}

impl LoadSession {
    pub fn idle() -> Self {
        Self {
            children: Vec::new(),
            grace: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.iter().map(Child::id).collect()
    }

    /// Terminate, wait up to the grace period, then kill whatever is left.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.children.is_empty() {
            return;
        }
        debug!(workers = self.children.len(), "stopping load workers");
        for child in &mut self.children {
            request_stop(child);
        }

        let deadline = Instant::now() + self.grace;
        loop {
            self.children
                .retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
            if self.children.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        for mut child in self.children.drain(..) {
            if let Err(err) = child.kill() {
                warn!(pid = child.id(), %err, "failed to kill load worker");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for LoadSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    let _ = child.kill();
}

const SECS_PLACEHOLDER: &str = "{secs}";

/// Spawns copies of a busy-loop command; `{secs}` in the argv is replaced by the lifetime.
#[derive(Debug, Clone)]
pub struct CpuBurner {
    argv: Vec<String>,
    grace: Duration,
}

impl CpuBurner {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            grace: Duration::from_secs(2),
        }
    }

    /// A python busy loop that exits after its deadline.
    pub fn python(interpreter: impl Into<String>) -> Self {
        Self::new([
            interpreter.into(),
            "-c".to_string(),
            format!(
                "import time\nend = time.time() + {SECS_PLACEHOLDER}\nwhile time.time() < end:\n    pass\n"
            ),
        ])
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn argv_for(&self, lifetime: Duration) -> Vec<String> {
        let secs = format!("{:.3}", lifetime.as_secs_f64());
        self.argv
            .iter()
            .map(|a| a.replace(SECS_PLACEHOLDER, &secs))
            .collect()
    }
}

impl Default for CpuBurner {
    fn default() -> Self {
        Self::python("python")
    }
}

impl LoadGenerator for CpuBurner {
    fn start(&self, workers: u32, lifetime: Duration) -> Result<LoadSession, AdapterError> {
        let argv = self.argv_for(lifetime);
        let (program, args) = argv.split_first().ok_or(AdapterError::EmptyArgv)?;

        // Workers started so far are stopped by the session's Drop if a later spawn fails.
        let mut session = LoadSession {
            children: Vec::with_capacity(workers as usize),
            grace: self.grace,
        };
        for _ in 0..workers {
            let child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|source| AdapterError::Spawn {
                    argv: argv.clone(),
                    source,
                })?;
            session.children.push(child);
        }
        debug!(workers, lifetime_s = lifetime.as_secs_f64(), "load workers started");
        Ok(session)
    }
}

/// The idle condition: no background load.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoad;

impl LoadGenerator for NoLoad {
    fn start(&self, _workers: u32, _lifetime: Duration) -> Result<LoadSession, AdapterError> {
        Ok(LoadSession::idle())
    }
}
