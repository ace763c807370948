//! Running one suite of one task against one repository.

use crate::command::PytestCommand;
use repograde_adapters::{CommandSpec, ProcessLauncher, SuperviseOptions, Supervisor};
use repograde_metrics::OutputProtocol;
use repograde_types::{AnalysisConfig, SuiteKind, SuiteResult, TaskConfig, Variant};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// The repository a suite runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub root: PathBuf,
    pub variant: Variant,

    /// Directory receiving one log file per suite; no log when `None`.
    pub log_dir: Option<PathBuf>,
}

impl Target {
    pub fn generated(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            variant: Variant::Generated,
            log_dir: None,
        }
    }

    pub fn reference(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            variant: Variant::Reference,
            log_dir: None,
        }
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn log_file(&self, name: &str) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|d| d.join(name))
    }
}

/// Executes test suites. Implementations never fail: problems come back as failed suites.
pub trait SuiteRunner {
    /// The whole suite of `kind`.
    fn run_suite(&self, task: &TaskConfig, target: &Target, kind: SuiteKind) -> SuiteResult;

    /// Every individually addressable test id of the suite of `kind`.
    fn collect_cases(&self, task: &TaskConfig, target: &Target, kind: SuiteKind) -> Vec<String>;

    /// Only the given test ids of the suite of `kind`.
    fn run_cases(
        &self,
        task: &TaskConfig,
        target: &Target,
        kind: SuiteKind,
        ids: &[String],
    ) -> SuiteResult;
}

impl<R: SuiteRunner> SuiteRunner for &R {
    fn run_suite(&self, task: &TaskConfig, target: &Target, kind: SuiteKind) -> SuiteResult {
        (**self).run_suite(task, target, kind)
    }

    fn collect_cases(&self, task: &TaskConfig, target: &Target, kind: SuiteKind) -> Vec<String> {
        (**self).collect_cases(task, target, kind)
    }

    fn run_cases(
        &self,
        task: &TaskConfig,
        target: &Target,
        kind: SuiteKind,
        ids: &[String],
    ) -> SuiteResult {
        (**self).run_cases(task, target, kind, ids)
    }
}

/// Runs suites as pytest processes under the [`Supervisor`].
///
/// Test processes start in the directory of the suite's test file, so collected ids and
/// subset runs resolve the same way.
pub struct SupervisedSuiteRunner<L> {
    supervisor: Supervisor<L>,
    command: PytestCommand,
    sample_interval: Duration,
    kill_grace: Duration,
    inherited_pythonpath: Option<String>,
}

impl<L: ProcessLauncher> SupervisedSuiteRunner<L> {
    pub fn new(launcher: L, command: PytestCommand) -> Self {
        Self {
            supervisor: Supervisor::new(launcher),
            command,
            sample_interval: Duration::from_millis(100),
            kill_grace: Duration::from_secs(2),
            inherited_pythonpath: std::env::var("PYTHONPATH").ok(),
        }
    }

    pub fn from_config(launcher: L, config: &AnalysisConfig) -> Self {
        Self::new(launcher, PytestCommand::new(config.python.clone()))
            .sample_interval(Duration::from_millis(config.sample_interval_ms))
            .kill_grace(Duration::from_millis(config.kill_grace_ms))
    }

    pub fn sample_interval(mut self, every: Duration) -> Self {
        self.sample_interval = every;
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn inherited_pythonpath(mut self, value: Option<String>) -> Self {
        self.inherited_pythonpath = value;
        self
    }

    fn spec(&self, task: &TaskConfig, target: &Target, test_file: &Path, argv: Vec<String>) -> CommandSpec {
        let spec = CommandSpec::new(argv).envs(task.suite_env(
            &target.root,
            target.variant,
            self.inherited_pythonpath.as_deref(),
        ));
        match test_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => spec.cwd(dir),
            None => spec,
        }
    }

    fn options(&self, task: &TaskConfig, kind: SuiteKind) -> SuperviseOptions {
        let mut opts = SuperviseOptions::new(task.timeout_for(kind));
        opts.sample_interval = self.sample_interval;
        opts.kill_grace = self.kill_grace;
        opts
    }

    /// The suite's test file, if it is configured and present.
    fn test_file<'t>(task: &'t TaskConfig, kind: SuiteKind) -> Result<&'t Path, String> {
        let path = task
            .suite_path(kind)
            .ok_or_else(|| format!("no {kind} suite configured"))?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(format!("test file not found: {}", path.display()))
        }
    }
}

impl<L: ProcessLauncher> SuiteRunner for SupervisedSuiteRunner<L> {
    fn run_suite(&self, task: &TaskConfig, target: &Target, kind: SuiteKind) -> SuiteResult {
        let test_file = match Self::test_file(task, kind) {
            Ok(p) => p,
            Err(reason) => return SuiteResult::not_run(reason),
        };

        let spec = self.spec(task, target, test_file, self.command.suite(kind, test_file));
        let mut opts = self.options(task, kind);
        if let Some(log) = target.log_file(&format!("{kind}.log")) {
            opts = opts.log_to(log);
        }
        if let Some(prefix) = kind.metric_prefix() {
            opts = opts.metric_prefix(prefix);
        }

        let result = self.supervisor.run(&spec, &opts);
        debug!(
            %kind,
            passed = result.counts.passed,
            total = result.counts.total,
            returncode = result.returncode,
            timed_out = result.timed_out,
            "suite finished"
        );
        result
    }

    fn collect_cases(&self, task: &TaskConfig, target: &Target, kind: SuiteKind) -> Vec<String> {
        let test_file = match Self::test_file(task, kind) {
            Ok(p) => p,
            Err(reason) => {
                warn!(%kind, %reason, "cannot collect test ids");
                return Vec::new();
            }
        };

        let spec = self.spec(task, target, test_file, self.command.collect(test_file));
        let mut opts = self.options(task, kind);
        if let Some(log) = target.log_file(&format!("{kind}_collect.log")) {
            opts = opts.log_to(log);
        }

        let outcome = self.supervisor.supervise(&spec, &opts);
        if let Some(err) = &outcome.launch_error {
            warn!(%kind, %err, "collection did not start");
            return Vec::new();
        }
        if outcome.timed_out {
            warn!(%kind, "collection timed out");
        }
        let ids = self.supervisor.protocol().case_ids(&outcome.output);
        debug!(%kind, count = ids.len(), "collected test ids");
        ids
    }

    fn run_cases(
        &self,
        task: &TaskConfig,
        target: &Target,
        kind: SuiteKind,
        ids: &[String],
    ) -> SuiteResult {
        let test_file = match Self::test_file(task, kind) {
            Ok(p) => p,
            Err(reason) => return SuiteResult::not_run(reason),
        };
        if ids.is_empty() {
            return SuiteResult::not_run("no test ids selected");
        }

        let spec = self.spec(task, target, test_file, self.command.cases(test_file, ids));
        let mut opts = self.options(task, kind);
        if let Some(log) = target.log_file(&format!("{kind}_subset.log")) {
            opts = opts.log_to(log);
        }
        self.supervisor.run(&spec, &opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repograde_adapters::{AdapterError, ProcessHandle, UsageSample};
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    /// Exits immediately with a fixed code and output; records every spec it launched.
    struct Canned {
        code: i32,
        output: String,
        launched: Rc<RefCell<Vec<CommandSpec>>>,
    }

    struct CannedHandle {
        code: i32,
        output: Option<String>,
    }

    impl ProcessHandle for CannedHandle {
        fn poll(&mut self) -> std::io::Result<Option<i32>> {
            Ok(Some(self.code))
        }

        fn drain_available_output(&mut self) -> Vec<String> {
            Vec::new()
        }

        fn drain_remaining_output(&mut self, _window: Duration) -> Vec<String> {
            self.output.take().into_iter().collect()
        }

        fn sum_tree_usage(&mut self) -> Option<UsageSample> {
            None
        }

        fn terminate_tree(&mut self, _grace: Duration) {}
    }

    impl ProcessLauncher for Canned {
        type Handle = CannedHandle;

        fn launch(&self, spec: &CommandSpec) -> Result<CannedHandle, AdapterError> {
            self.launched.borrow_mut().push(spec.clone());
            Ok(CannedHandle {
                code: self.code,
                output: Some(self.output.clone()),
            })
        }
    }

    fn runner(code: i32, output: &str) -> (SupervisedSuiteRunner<Canned>, Rc<RefCell<Vec<CommandSpec>>>) {
        let launched = Rc::new(RefCell::new(Vec::new()));
        let launcher = Canned {
            code,
            output: output.to_string(),
            launched: Rc::clone(&launched),
        };
        let runner = SupervisedSuiteRunner::new(launcher, PytestCommand::new("py"))
            .sample_interval(Duration::from_millis(1))
            .inherited_pythonpath(None);
        (runner, launched)
    }

    fn task_with(dir: &Path, kind: SuiteKind) -> TaskConfig {
        let tests = dir.join("tests");
        fs::create_dir_all(&tests).unwrap();
        let file = tests.join(format!("test_{kind}.py"));
        fs::write(&file, "def test_x():\n    pass\n").unwrap();
        let mut task = TaskConfig::new("demo", "demo_pkg");
        task.suites.insert(kind, file);
        task
    }

    #[test]
    fn suite_runs_pytest_in_test_directory_with_target_env() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with(dir.path(), SuiteKind::Functional);
        let (runner, launched) = runner(0, "collected 2 items\n..\n2 passed in 0.01s\n");

        let target = Target::generated("/cand");
        let result = runner.run_suite(&task, &target, SuiteKind::Functional);
        assert_eq!(result.counts.passed, 2);
        assert_eq!(result.counts.total, 2);
        assert_eq!(result.returncode, 0);

        let specs = launched.borrow();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].argv[..3], ["py", "-m", "pytest"]);
        assert_eq!(specs[0].cwd.as_deref(), Some(dir.path().join("tests").as_path()));
        assert!(specs[0]
            .env
            .contains(&("DEMO_TARGET".to_string(), "generated".to_string())));
        assert!(specs[0]
            .env
            .contains(&("RACB_REPO_ROOT".to_string(), "/cand".to_string())));
    }

    #[test]
    fn metric_suite_reads_prefix_and_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with(dir.path(), SuiteKind::Security);
        let (runner, _) = runner(
            0,
            "SECURITY_METRICS high_risk_count=2 total=5\n1 passed in 0.1s\n",
        );

        let logs = dir.path().join("logs");
        let target = Target::generated(dir.path()).log_dir(&logs);
        let result = runner.run_suite(&task, &target, SuiteKind::Security);
        assert_eq!(result.metrics.get("high_risk_count"), Some(&2.0));
        let log = fs::read_to_string(logs.join("security.log")).unwrap();
        assert!(log.contains("SECURITY_METRICS"));
    }

    #[test]
    fn missing_test_file_is_not_launched() {
        let mut task = TaskConfig::new("demo", "demo");
        task.suites
            .insert(SuiteKind::Robustness, PathBuf::from("/nope/test_r.py"));
        let (runner, launched) = runner(0, "");

        let result = runner.run_suite(&task, &Target::generated("/cand"), SuiteKind::Robustness);
        assert!(result.is_failed());
        assert_eq!(result.counts.total, 1);
        assert!(result.error.unwrap().contains("test file not found"));
        assert!(launched.borrow().is_empty());
    }

    #[test]
    fn collect_keeps_test_ids_only() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with(dir.path(), SuiteKind::Functional);
        let (runner, launched) = runner(
            0,
            "test_functional.py::test_a\ntest_functional.py::test_b\n<Module x>\n\n2 tests collected in 0.01s\n",
        );

        let ids = runner.collect_cases(&task, &Target::generated("/cand"), SuiteKind::Functional);
        assert_eq!(ids, vec!["test_functional.py::test_a", "test_functional.py::test_b"]);
        assert!(launched.borrow()[0].argv.contains(&"--collect-only".to_string()));
    }

    #[test]
    fn subset_passes_ids_and_empty_subset_is_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with(dir.path(), SuiteKind::Functional);
        let (runner, launched) = runner(1, "1 failed, 1 passed in 0.1s\n");

        let ids = vec!["t::a".to_string(), "t::b".to_string()];
        let target = Target::generated("/cand");
        let result = runner.run_cases(&task, &target, SuiteKind::Functional, &ids);
        assert_eq!(result.counts.failed, 1);
        assert_eq!(result.counts.total, 2);
        assert_eq!(launched.borrow()[0].argv[3..5], ["t::a", "t::b"]);

        let empty = runner.run_cases(&task, &target, SuiteKind::Functional, &[]);
        assert_eq!(empty.error.as_deref(), Some("no test ids selected"));
        assert_eq!(launched.borrow().len(), 1);
    }
}
