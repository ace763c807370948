//! Workspace integration tests.
//!
//! `scripted` drives the use cases through an in-memory runner; `process` runs them
//! against real child processes (a shell script standing in for the python test runner).

mod config;
mod scripted;

#[cfg(unix)]
mod process;

use repograde_types::{BaselineEntry, SuiteKind, TaskConfig, keys};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Route library logs to the test output; `RUST_LOG=debug` shows supervisor events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Task with one trivial test file per kind under `dir/tests`.
pub fn task_with_suites(dir: &Path, project: &str, kinds: &[SuiteKind]) -> TaskConfig {
    let tests = dir.join("tests");
    fs::create_dir_all(&tests).unwrap();
    let mut task = TaskConfig::new(project, "pkg");
    for &kind in kinds {
        let file = tests.join(format!("test_{kind}.py"));
        fs::write(&file, "def test_ok():\n    pass\n").unwrap();
        task.suites.insert(kind, file);
    }
    task
}

pub fn baseline(pairs: &[(&str, f64)]) -> BaselineEntry {
    BaselineEntry {
        metrics: BTreeMap::new(),
        values: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    }
}

pub fn perf_baseline(secs: f64) -> BaselineEntry {
    baseline(&[(keys::PERFORMANCE_SUITE_TIME_S, secs)])
}

/// A minimal package that passes the import gate.
pub fn clean_candidate(root: &Path) {
    fs::create_dir_all(root.join("pkg")).unwrap();
    fs::write(root.join("pkg/__init__.py"), "from .core import run\n").unwrap();
    fs::write(root.join("pkg/core.py"), "def run():\n    return 1\n").unwrap();
}
