//! Real child processes: a shell script plays the python test runner.

use super::{clean_candidate, init_tracing, task_with_suites};
use repograde_adapters::{
    CommandSpec, CpuBurner, LoadGenerator, OsLauncher, SuperviseOptions, Supervisor,
};
use repograde_app::{
    BaselineMeasurement, EvaluateCandidateUseCase, EvaluateRequest, GatePolicy,
    MeasureBaselineUseCase, PytestCommand, SuiteRunner, SupervisedSuiteRunner, SystemClock,
    Target,
};
use repograde_types::{SuiteKind, TIMEOUT_RETURNCODE, TaskConfig, ToolInfo, keys};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Accepts `-m pytest <file|ids...> ...`. A candidate fails one test when it contains a
/// `broken` marker and reports the high-risk count stored in its `high_risk` file.
///
/// Like pytest, collection lists ids relative to the directory holding a `pytest.ini`
/// unless `--rootdir` is given, and ids whose file does not exist under the working
/// directory are an error.
const FAKE_PYTEST: &str = r#"#!/bin/sh
shift 2
case " $* " in
  *" --collect-only "*)
    prefix=""
    case " $* " in
      *" --rootdir="*) ;;
      *) [ -f ../pytest.ini ] && prefix="$(basename "$PWD")/" ;;
    esac
    echo "${prefix}test_functional.py::test_one"
    echo "${prefix}test_functional.py::test_two"
    echo ""
    echo "2 tests collected in 0.01s"
    exit 0
    ;;
esac
for arg in "$@"; do
  case "$arg" in
    *::*)
      if [ ! -f "${arg%%::*}" ]; then
        echo "ERROR: file or directory not found: $arg"
        echo "no tests ran in 0.01s"
        exit 4
      fi
      ;;
  esac
done
echo "variant=$DEMO_TARGET root=$RACB_REPO_ROOT"
case "$1" in
  *test_security.py)
    risk=0
    [ -f "$RACB_REPO_ROOT/high_risk" ] && risk=$(cat "$RACB_REPO_ROOT/high_risk")
    echo "SECURITY_METRICS high_risk_count=$risk files_scanned=3"
    ;;
esac
echo "collected 2 items"
if [ -f "$RACB_REPO_ROOT/broken" ]; then
  echo "1 failed, 1 passed in 0.01s"
  exit 1
fi
echo "2 passed in 0.01s"
"#;

fn fake_python(dir: &Path) -> PathBuf {
    let path = dir.join("fake-python");
    fs::write(&path, FAKE_PYTEST).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn runner(dir: &Path) -> SupervisedSuiteRunner<OsLauncher> {
    init_tracing();
    let python = fake_python(dir);
    SupervisedSuiteRunner::new(OsLauncher, PytestCommand::new(python.to_string_lossy()))
        .sample_interval(Duration::from_millis(20))
        .kill_grace(Duration::from_millis(200))
        .inherited_pythonpath(None)
}

fn demo_task(dir: &Path) -> TaskConfig {
    let mut task = task_with_suites(
        dir,
        "demo",
        &[SuiteKind::Functional, SuiteKind::Security, SuiteKind::Performance],
    );
    task.default_timeout = Duration::from_secs(30);
    task
}

#[test]
fn measured_baseline_then_evaluated_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = demo_task(dir.path());
    let runner = runner(dir.path());

    let reference = dir.path().join("reference");
    clean_candidate(&reference);
    let measured = MeasureBaselineUseCase::new(&runner, SystemClock, ToolInfo::current())
        .execute(
            &task,
            BaselineMeasurement {
                root: Some(reference.clone()),
                log_dir: Some(dir.path().join("logs/reference")),
            },
        )
        .unwrap();
    assert!(measured.failed_suites.is_empty(), "{:?}", measured.failed_suites);
    let security = &measured.baselines[&SuiteKind::Security];
    assert_eq!(security.get(keys::HIGH_RISK_COUNT), Some(0.0));
    assert_eq!(security.get("security_tests_total"), Some(2.0));
    let perf = &measured.baselines[&SuiteKind::Performance];
    assert!(perf.get(keys::PERFORMANCE_SUITE_TIME_S).unwrap() > 0.0);
    let log = fs::read_to_string(dir.path().join("logs/reference/security.log")).unwrap();
    assert!(log.contains("variant=reference"), "{log}");
    task.baselines = measured.baselines;

    let evaluate = EvaluateCandidateUseCase::new(&runner, SystemClock, ToolInfo::current());
    let run = |name: &str| {
        let root = dir.path().join(name);
        evaluate
            .execute(
                &task,
                EvaluateRequest {
                    candidate: name.to_string(),
                    target: Target::generated(&root).log_dir(dir.path().join("logs").join(name)),
                    gate: GatePolicy::Enforce,
                },
            )
            .unwrap()
    };

    let good = dir.path().join("good");
    clean_candidate(&good);
    let eval = run("good");
    assert_eq!(eval.record.functional_score, 1.0);
    assert_eq!(eval.suites[&SuiteKind::Security].score.score, 1.0);
    let log = fs::read_to_string(dir.path().join("logs/good/functional.log")).unwrap();
    assert!(log.contains("variant=generated"), "{log}");
    assert!(log.contains(good.to_str().unwrap()), "{log}");

    let risky = dir.path().join("risky");
    clean_candidate(&risky);
    fs::write(risky.join("high_risk"), "3").unwrap();
    let eval = run("risky");
    // (0 + 1) / (3 + 1)
    assert_eq!(eval.suites[&SuiteKind::Security].score.score, 0.25);
    assert_eq!(
        eval.suites[&SuiteKind::Security].result.metrics.get("files_scanned"),
        Some(&3.0)
    );

    let broken = dir.path().join("broken");
    clean_candidate(&broken);
    fs::write(broken.join("broken"), "").unwrap();
    let eval = run("broken");
    assert_eq!(eval.record.functional_score, 0.5);
    assert_eq!(eval.suites[&SuiteKind::Performance].score.score, 0.0);
    assert!(eval.suites[&SuiteKind::Performance].score.inputs.failed_suite);
}

#[test]
fn collection_lists_test_ids() {
    let dir = tempfile::tempdir().unwrap();
    let task = demo_task(dir.path());
    let root = dir.path().join("cand");
    clean_candidate(&root);

    let runner = runner(dir.path());
    let target = Target::generated(&root);
    let ids = runner.collect_cases(&task, &target, SuiteKind::Functional);
    assert_eq!(
        ids,
        vec!["test_functional.py::test_one", "test_functional.py::test_two"]
    );

    let subset = runner.run_cases(&task, &target, SuiteKind::Functional, &ids[..1]);
    assert_eq!(subset.counts.passed, 2);
    assert_eq!(subset.returncode, 0);
}

#[test]
fn collected_ids_rerun_under_an_ini_file_above_the_suite() {
    let dir = tempfile::tempdir().unwrap();
    let task = demo_task(dir.path());
    fs::write(dir.path().join("pytest.ini"), "[pytest]\n").unwrap();
    let root = dir.path().join("cand");
    clean_candidate(&root);

    let runner = runner(dir.path());
    let target = Target::generated(&root);
    let ids = runner.collect_cases(&task, &target, SuiteKind::Functional);
    assert_eq!(ids[0], "test_functional.py::test_one");

    let subset = runner.run_cases(&task, &target, SuiteKind::Functional, &ids);
    assert_eq!(subset.returncode, 0, "{:?}", subset.error);
    assert_eq!(subset.counts.failed, 0);
    assert_eq!(subset.counts.passed, 2);
}

#[test]
fn missing_interpreter_is_a_failed_suite() {
    let dir = tempfile::tempdir().unwrap();
    let task = demo_task(dir.path());
    let root = dir.path().join("cand");
    clean_candidate(&root);

    let runner = SupervisedSuiteRunner::new(OsLauncher, PytestCommand::new("/no/such/python"));
    let result = runner.run_suite(&task, &Target::generated(&root), SuiteKind::Functional);
    assert!(result.is_failed());
    assert_eq!(result.counts.total, 1);
    assert!(result.error.is_some());
}

#[test]
fn timeout_kills_the_whole_tree() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
    let opts = SuperviseOptions {
        sample_interval: Duration::from_millis(20),
        kill_grace: Duration::from_millis(200),
        drain_window: Duration::from_millis(500),
        ..SuperviseOptions::new(Duration::from_millis(500))
    };

    let start = Instant::now();
    let result = Supervisor::new(OsLauncher).run(&CommandSpec::new(["sh", "-c", &script]), &opts);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(result.timed_out);
    assert!(
        (0.5..2.0).contains(&result.elapsed_s),
        "elapsed {} should track the 0.5s timeout",
        result.elapsed_s
    );
    assert_eq!(result.returncode, TIMEOUT_RETURNCODE);
    assert!(result.is_failed());
    assert_eq!(result.counts.total, 1);

    #[cfg(target_os = "linux")]
    {
        let pid = fs::read_to_string(&pid_file).unwrap();
        let proc_dir = PathBuf::from(format!("/proc/{}", pid.trim()));
        let deadline = Instant::now() + Duration::from_secs(2);
        while proc_alive(&proc_dir) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!proc_alive(&proc_dir), "grandchild {} survived", pid.trim());
    }
}

/// Running and not yet reaped as a zombie.
#[cfg(target_os = "linux")]
fn proc_alive(proc_dir: &Path) -> bool {
    fs::read_to_string(proc_dir.join("stat"))
        .map(|stat| {
            stat.rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z")
        })
        .unwrap_or(false)
}

#[test]
fn load_workers_stop_with_their_session() {
    let burner = CpuBurner::new(["sleep", "{secs}"]).with_grace(Duration::from_millis(500));
    let session = burner.start(2, Duration::from_secs(30)).unwrap();
    assert_eq!(session.len(), 2);
    let pids = session.pids();

    let start = Instant::now();
    session.stop();
    assert!(start.elapsed() < Duration::from_secs(5));

    #[cfg(target_os = "linux")]
    for pid in pids {
        assert!(!proc_alive(Path::new(&format!("/proc/{pid}"))));
    }
    #[cfg(not(target_os = "linux"))]
    let _ = pids;
}
