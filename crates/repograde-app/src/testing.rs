//! Test doubles shared by the use-case tests.

use crate::Clock;
use crate::runner::{SuiteRunner, Target};
use repograde_adapters::{AdapterError, LoadGenerator, LoadSession};
use repograde_types::{BaselineEntry, SuiteKind, SuiteResult, TaskConfig, TestCounts, keys};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

pub struct FixedClock;

impl Clock for FixedClock {
    fn now_rfc3339(&self) -> String {
        "2026-01-01T00:00:00Z".to_string()
    }
}

/// A task whose suites point at real (trivial) test files under `dir/tests`, with
/// baselines for every scored measurement.
pub fn fixture_task(dir: &Path, kinds: &[SuiteKind]) -> TaskConfig {
    let tests = dir.join("tests");
    fs::create_dir_all(&tests).unwrap();
    let mut task = TaskConfig::new("demo", "demo_pkg");
    for &kind in kinds {
        let file = tests.join(format!("test_{kind}.py"));
        fs::write(&file, "def test_ok():\n    pass\n").unwrap();
        task.suites.insert(kind, file);
    }

    let entry = |pairs: &[(&str, f64)]| BaselineEntry {
        metrics: BTreeMap::new(),
        values: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    };
    task.baselines
        .insert(SuiteKind::Security, entry(&[(keys::HIGH_RISK_COUNT, 0.0)]));
    task.baselines
        .insert(SuiteKind::Maintainability, entry(&[(keys::MI_MIN, 50.0)]));
    task.baselines.insert(
        SuiteKind::Performance,
        entry(&[(keys::PERFORMANCE_SUITE_TIME_S, 1.0)]),
    );
    task.baselines.insert(
        SuiteKind::Resource,
        entry(&[(keys::AVG_MEMORY_MB, 50.0), (keys::AVG_CPU_PERCENT, 50.0)]),
    );
    task
}

fn passing(passed: u32, total: u32) -> SuiteResult {
    let failed = total - passed;
    SuiteResult {
        counts: TestCounts {
            passed,
            failed,
            skipped: 0,
            total,
        },
        returncode: i32::from(failed > 0),
        elapsed_s: 1.0,
        avg_memory_mb: 50.0,
        avg_cpu_percent: 50.0,
        metrics: BTreeMap::new(),
        timed_out: false,
        output: String::new(),
        error: None,
    }
}

/// Deterministic runner keyed by candidate directory name.
///
/// Unscripted suites pass 1/1 at baseline speed and footprint. Test case `i` of a suite
/// with `passed` passing tests passes iff `i < passed`, so running every collected case
/// reproduces the full-suite counts.
#[derive(Default)]
pub struct ScriptedRunner {
    results: BTreeMap<(String, SuiteKind), SuiteResult>,
    slow_under_load: BTreeMap<String, f64>,
    loaded: Option<Rc<Cell<bool>>>,
    calls: Cell<usize>,
    subsets: RefCell<Vec<(String, SuiteKind, usize)>>,
}

impl ScriptedRunner {
    fn entry(&mut self, cand: &str, kind: SuiteKind) -> &mut SuiteResult {
        self.results
            .entry((cand.to_string(), kind))
            .or_insert_with(|| passing(1, 1))
    }

    pub fn pass_ratio(mut self, cand: &str, kind: SuiteKind, passed: u32, total: u32) -> Self {
        let e = self.entry(cand, kind);
        let kept = (e.elapsed_s, e.avg_memory_mb, e.avg_cpu_percent, e.metrics.clone());
        *e = passing(passed, total);
        (e.elapsed_s, e.avg_memory_mb, e.avg_cpu_percent, e.metrics) = kept;
        self
    }

    pub fn metric(mut self, cand: &str, kind: SuiteKind, key: &str, value: f64) -> Self {
        self.entry(cand, kind).metrics.insert(key.to_string(), value);
        self
    }

    pub fn footprint(mut self, cand: &str, kind: SuiteKind, mem_mb: f64, cpu: f64) -> Self {
        let e = self.entry(cand, kind);
        e.avg_memory_mb = mem_mb;
        e.avg_cpu_percent = cpu;
        self
    }

    pub fn elapsed(mut self, cand: &str, kind: SuiteKind, secs: f64) -> Self {
        self.entry(cand, kind).elapsed_s = secs;
        self
    }

    /// Multiply elapsed time of `cand` by `factor` once `flag` is set.
    pub fn slow_under_load(mut self, cand: &str, factor: f64, flag: Rc<Cell<bool>>) -> Self {
        self.slow_under_load.insert(cand.to_string(), factor);
        self.loaded = Some(flag);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// `(candidate, kind, number of ids)` for every subset run.
    pub fn subsets(&self) -> Vec<(String, SuiteKind, usize)> {
        self.subsets.borrow().clone()
    }

    fn candidate(target: &Target) -> String {
        target
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn scripted(&self, cand: &str, kind: SuiteKind) -> SuiteResult {
        let mut r = self
            .results
            .get(&(cand.to_string(), kind))
            .cloned()
            .unwrap_or_else(|| passing(1, 1));
        let loaded = self.loaded.as_ref().is_some_and(|f| f.get());
        if let (true, Some(factor)) = (loaded, self.slow_under_load.get(cand)) {
            r.elapsed_s *= factor;
            r.avg_cpu_percent *= factor;
        }
        r
    }
}

impl SuiteRunner for ScriptedRunner {
    fn run_suite(&self, _task: &TaskConfig, target: &Target, kind: SuiteKind) -> SuiteResult {
        self.calls.set(self.calls.get() + 1);
        self.scripted(&Self::candidate(target), kind)
    }

    fn collect_cases(&self, _task: &TaskConfig, target: &Target, kind: SuiteKind) -> Vec<String> {
        let total = self.scripted(&Self::candidate(target), kind).counts.total;
        (0..total).map(|i| format!("test_{kind}.py::case_{i}")).collect()
    }

    fn run_cases(
        &self,
        _task: &TaskConfig,
        target: &Target,
        kind: SuiteKind,
        ids: &[String],
    ) -> SuiteResult {
        self.calls.set(self.calls.get() + 1);
        let cand = Self::candidate(target);
        self.subsets.borrow_mut().push((cand.clone(), kind, ids.len()));

        let full = self.scripted(&cand, kind);
        let passed = ids
            .iter()
            .filter_map(|id| id.rsplit("case_").next()?.parse::<u32>().ok())
            .filter(|i| *i < full.counts.passed)
            .count() as u32;
        let mut r = passing(passed, ids.len() as u32);
        r.elapsed_s = full.elapsed_s;
        r
    }
}

/// Load generator that only flips a flag; no processes are started.
pub struct FlagLoad {
    pub loaded: Rc<Cell<bool>>,
    pub starts: Cell<u32>,
    pub last: Cell<Option<(u32, Duration)>>,
}

impl FlagLoad {
    pub fn new(loaded: Rc<Cell<bool>>) -> Self {
        Self {
            loaded,
            starts: Cell::new(0),
            last: Cell::new(None),
        }
    }
}

impl LoadGenerator for FlagLoad {
    fn start(&self, workers: u32, lifetime: Duration) -> Result<LoadSession, AdapterError> {
        self.loaded.set(true);
        self.starts.set(self.starts.get() + 1);
        self.last.set(Some((workers, lifetime)));
        Ok(LoadSession::idle())
    }
}
