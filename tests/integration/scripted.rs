//! Use cases driven by a deterministic in-memory runner.

use super::{clean_candidate, perf_baseline, task_with_suites};
use approx::assert_relative_eq;
use repograde_adapters::NoLoad;
use repograde_app::{
    Candidate, Clock, ConfidenceAnalyzer, ConfidenceTable, EvaluateCandidateUseCase,
    EvaluateRequest, ExportFormat, ExportUseCase, GatePolicy, SuiteRunner, Target,
    render_confidence_markdown,
};
use repograde_types::{
    AnalysisConfig, GateIssueKind, SuiteKind, SuiteResult, TaskConfig, TestCounts, ToolInfo,
};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;

struct FixedClock;

impl Clock for FixedClock {
    fn now_rfc3339(&self) -> String {
        "2026-03-01T12:00:00Z".to_string()
    }
}

/// What one candidate does when its suites run.
#[derive(Clone, Copy)]
struct Behaviour {
    functional: (u32, u32),
    robustness: (u32, u32),
    perf_s: f64,
}

/// Candidates are told apart by their directory name. Case `i` of a suite passes iff
/// `i < passed`.
#[derive(Default)]
struct FakeRunner {
    behaviours: BTreeMap<String, Behaviour>,
    launches: Cell<usize>,
}

impl FakeRunner {
    fn with(mut self, name: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(name.to_string(), behaviour);
        self
    }

    fn behaviour(&self, target: &Target) -> Behaviour {
        let name = target
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.behaviours[&name]
    }

    fn counts(b: Behaviour, kind: SuiteKind) -> (u32, u32) {
        match kind {
            SuiteKind::Functional => b.functional,
            SuiteKind::Robustness => b.robustness,
            _ => (1, 1),
        }
    }
}

fn result(passed: u32, total: u32, elapsed_s: f64) -> SuiteResult {
    let failed = total - passed;
    SuiteResult {
        counts: TestCounts {
            passed,
            failed,
            skipped: 0,
            total,
        },
        returncode: i32::from(failed > 0),
        elapsed_s,
        avg_memory_mb: 40.0,
        avg_cpu_percent: 80.0,
        metrics: BTreeMap::new(),
        timed_out: false,
        output: String::new(),
        error: None,
    }
}

impl SuiteRunner for FakeRunner {
    fn run_suite(&self, _task: &TaskConfig, target: &Target, kind: SuiteKind) -> SuiteResult {
        self.launches.set(self.launches.get() + 1);
        let b = self.behaviour(target);
        let (passed, total) = Self::counts(b, kind);
        let elapsed = if kind == SuiteKind::Performance { b.perf_s } else { 0.5 };
        result(passed, total, elapsed)
    }

    fn collect_cases(&self, _task: &TaskConfig, target: &Target, kind: SuiteKind) -> Vec<String> {
        let (_, total) = Self::counts(self.behaviour(target), kind);
        (0..total).map(|i| format!("test_{kind}.py::case_{i}")).collect()
    }

    fn run_cases(
        &self,
        _task: &TaskConfig,
        target: &Target,
        kind: SuiteKind,
        ids: &[String],
    ) -> SuiteResult {
        self.launches.set(self.launches.get() + 1);
        let (passed, _) = Self::counts(self.behaviour(target), kind);
        let ok = ids
            .iter()
            .filter_map(|id| id.rsplit("case_").next()?.parse::<u32>().ok())
            .filter(|i| *i < passed)
            .count() as u32;
        result(ok, ids.len() as u32, 0.5)
    }
}

const STRONG: Behaviour = Behaviour {
    functional: (4, 4),
    robustness: (4, 4),
    perf_s: 1.0,
};

const WEAK: Behaviour = Behaviour {
    functional: (2, 4),
    robustness: (1, 4),
    perf_s: 4.0,
};

fn ranking_task(dir: &std::path::Path) -> TaskConfig {
    let mut task = task_with_suites(
        dir,
        "ranking",
        &[SuiteKind::Functional, SuiteKind::Robustness, SuiteKind::Performance],
    );
    task.baselines.insert(SuiteKind::Performance, perf_baseline(1.0));
    task
}

fn analysis_config(log_dir: &std::path::Path) -> AnalysisConfig {
    AnalysisConfig {
        reruns: 3,
        budget_ratios: vec![0.25, 0.5, 1.0],
        budget_repeats: 12,
        noise_repeats: 2,
        log_dir: log_dir.to_path_buf(),
        ..AnalysisConfig::default()
    }
}

#[test]
fn evaluation_scores_and_exports_every_suite() {
    let dir = tempfile::tempdir().unwrap();
    let task = ranking_task(dir.path());
    let root = dir.path().join("weak");
    clean_candidate(&root);

    let runner = FakeRunner::default().with("weak", WEAK);
    let uc = EvaluateCandidateUseCase::new(&runner, FixedClock, ToolInfo::current());
    let eval = uc
        .execute(
            &task,
            EvaluateRequest {
                candidate: "weak".into(),
                target: Target::generated(&root),
                gate: GatePolicy::Enforce,
            },
        )
        .unwrap();

    assert_eq!(eval.started_at, "2026-03-01T12:00:00Z");
    assert!(eval.gate.as_ref().unwrap().ok);
    assert_relative_eq!(eval.record.functional_score, 0.5);
    // robustness 0.25 and performance 0.25, whatever the weights
    assert_relative_eq!(eval.record.non_functional_score, 0.25, epsilon = 1e-12);
    assert_eq!(eval.suites.len(), 3);

    let csv = ExportUseCase::export_evaluation(&eval, ExportFormat::Csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4, "{csv}");
    assert!(lines[0].starts_with("task,candidate,suite,score"));
    assert!(lines[1].starts_with("ranking,weak,functional,0.500000"));

    let jsonl = ExportUseCase::export_evaluation(&eval, ExportFormat::Jsonl).unwrap();
    for line in jsonl.lines() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(v["candidate"], "weak");
    }

    let round_trip: repograde_types::CandidateEvaluation =
        serde_json::from_str(&serde_json::to_string(&eval).unwrap()).unwrap();
    assert_eq!(round_trip, eval);
}

#[test]
fn gate_failure_scores_zero_without_running_suites() {
    let dir = tempfile::tempdir().unwrap();
    let task = ranking_task(dir.path());
    let root = dir.path().join("strong");
    clean_candidate(&root);
    fs::write(root.join("pkg/core.py"), "def run(:\n    return 1\n").unwrap();

    let runner = FakeRunner::default().with("strong", STRONG);
    let uc = EvaluateCandidateUseCase::new(&runner, FixedClock, ToolInfo::current());
    let request = |gate| EvaluateRequest {
        candidate: "strong".into(),
        target: Target::generated(&root),
        gate,
    };

    let eval = uc.execute(&task, request(GatePolicy::Enforce)).unwrap();
    assert_eq!(runner.launches.get(), 0);
    assert_eq!(eval.record.functional_score, 0.0);
    assert_eq!(eval.record.non_functional_score, 0.0);
    let gate = eval.gate.unwrap();
    assert_eq!(gate.issues[0].kind, GateIssueKind::SyntaxError);
    assert!(eval.suites.values().all(|s| s.score.score == 0.0));

    // Report-only still runs the battery.
    let eval = uc.execute(&task, request(GatePolicy::Report)).unwrap();
    assert!(!eval.gate.unwrap().ok);
    assert_eq!(eval.record.functional_score, 1.0);
}

#[test]
fn missing_candidate_root_aborts_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let task = ranking_task(dir.path());
    let runner = FakeRunner::default();
    let uc = EvaluateCandidateUseCase::new(&runner, FixedClock, ToolInfo::current());
    let err = uc
        .execute(
            &task,
            EvaluateRequest {
                candidate: "ghost".into(),
                target: Target::generated(dir.path().join("ghost")),
                gate: GatePolicy::Enforce,
            },
        )
        .unwrap_err();
    assert!(format!("{err:#}").contains("repository root does not exist"));
}

#[test]
fn clear_winner_is_stable_under_every_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let task = ranking_task(dir.path());
    let candidates = [
        Candidate::new("strong", dir.path().join("strong")),
        Candidate::new("weak", dir.path().join("weak")),
    ];
    for c in &candidates {
        clean_candidate(&c.root);
    }

    let runner = FakeRunner::default().with("strong", STRONG).with("weak", WEAK);
    let analyzer = ConfidenceAnalyzer::new(&runner, NoLoad, analysis_config(&dir.path().join("logs")));
    let report = analyzer.analyze(&task, &candidates).unwrap();

    // Deterministic candidates do not vary between reruns.
    assert_eq!(report.rerun.len(), 2);
    assert_eq!(report.rerun_details.len(), 6);
    for s in &report.rerun {
        assert_eq!(s.runs, 3);
        assert_eq!(s.cv_of("functional"), 0.0);
        assert_eq!(s.cv_of("non_functional"), 0.0);
    }
    let strong = report.rerun.iter().find(|s| s.candidate == "strong").unwrap();
    assert_relative_eq!(strong.mean_of("non_functional"), 1.0);

    assert_eq!(report.budget.len(), 3);
    for b in &report.budget {
        assert_eq!(b.repeats, 12);
        assert_relative_eq!(b.spearman_mean, 1.0);
        assert_relative_eq!(b.top1_stability, 1.0);
        assert_eq!(b.flip_mean, 0.0);
    }
    let full = report.budget.iter().find(|b| b.ratio == 1.0).unwrap();
    assert_relative_eq!(full.functional_spearman_mean, 1.0);
    assert!(
        report
            .budget_details
            .iter()
            .all(|d| d.top1_sampled.as_deref() == Some("strong"))
    );

    // No load generator: idle and noisy agree.
    assert_eq!(report.noise.len(), 1);
    let noise = &report.noise[0];
    assert_eq!(noise.repeats, 2);
    assert_relative_eq!(noise.spearman, 1.0);
    assert!(!noise.top1_flipped);
    assert_eq!(noise.top1_idle.as_deref(), Some("strong"));

    let md = render_confidence_markdown(&report);
    assert!(md.contains("| ranking | `strong` | 3 |"));
    assert!(md.contains("- top-1 flips: 0/1"));

    for table in ConfidenceTable::ALL {
        let csv = ExportUseCase::export_confidence(&report, table, ExportFormat::Csv).unwrap();
        assert!(csv.lines().count() > 1, "{} has no rows", table.file_stem());
    }
}

#[test]
fn analysis_fails_for_a_missing_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let task = ranking_task(dir.path());
    let runner = FakeRunner::default().with("strong", STRONG);
    let analyzer = ConfidenceAnalyzer::new(&runner, NoLoad, analysis_config(&dir.path().join("logs")));
    let err = analyzer
        .analyze(&task, &[Candidate::new("strong", dir.path().join("strong"))])
        .unwrap_err();
    assert!(err.to_string().contains("candidate repository not found"));
    assert_eq!(runner.launches.get(), 0);
}
