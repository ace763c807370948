//! Std adapters for repograde.
//!
//! In clean-arch terms: this is where we touch the world. The supervisor's control loop
//! only talks to [`ProcessHandle`]; the OS-specific parts (signals, process-tree
//! introspection) live behind it in [`os`].

mod load;
pub mod os;
mod supervisor;

pub use load::{CpuBurner, LoadGenerator, LoadSession, NoLoad};
pub use os::{OsLauncher, OsProcess};
pub use supervisor::{ProcessOutcome, SuperviseOptions, Supervisor};

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,

    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }
}

/// Summed resource usage of a process and all of its live descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSample {
    pub rss_bytes: u64,
    pub cpu_percent: f64,
}

impl UsageSample {
    pub fn rss_mb(&self) -> f64 {
        self.rss_bytes as f64 / (1024.0 * 1024.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("command argv must not be empty")]
    EmptyArgv,

    #[error("failed to start {argv:?}: {source}")]
    Spawn {
        argv: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A launched process tree as seen by the supervisor.
pub trait ProcessHandle {
    /// Exit code once the root process has exited.
    fn poll(&mut self) -> std::io::Result<Option<i32>>;

    /// Output chunks that arrived since the last call; never blocks.
    fn drain_available_output(&mut self) -> Vec<String>;

    /// Output still in flight after exit, waiting at most `window`.
    fn drain_remaining_output(&mut self, window: Duration) -> Vec<String>;

    /// Usage summed over the root and every live descendant, or `None` once the root is gone.
    fn sum_tree_usage(&mut self) -> Option<UsageSample>;

    /// Ask the whole tree to stop, then force it after `grace`. Reaps the root.
    fn terminate_tree(&mut self, grace: Duration);
}

pub trait ProcessLauncher {
    type Handle: ProcessHandle;

    fn launch(&self, spec: &CommandSpec) -> Result<Self::Handle, AdapterError>;
}

impl<L: ProcessLauncher> ProcessLauncher for &L {
    type Handle = L::Handle;

    fn launch(&self, spec: &CommandSpec) -> Result<Self::Handle, AdapterError> {
        (**self).launch(spec)
    }
}
