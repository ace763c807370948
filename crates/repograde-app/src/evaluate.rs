//! Evaluating one candidate repository against one task.

use crate::Clock;
use crate::runner::{SuiteRunner, Target};
use anyhow::Context;
use repograde_domain::{aggregate_scores, not_run_score, score_suite, zero_record};
use repograde_gate::ImportGate;
use repograde_types::{
    CandidateEvaluation, ScoreRecord, SuiteEvaluation, SuiteKind, SuiteResult, TaskConfig,
    ToolInfo, keys,
};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What to do with the import gate before running suites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatePolicy {
    /// Do not run the gate.
    Skip,

    /// Run it and attach the outcome, but evaluate regardless.
    Report,

    /// Run it and score every suite 0 without launching anything when it fails.
    #[default]
    Enforce,
}

#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    /// Stable identifier of the candidate (used in reports and rankings).
    pub candidate: String,
    pub target: Target,
    pub gate: GatePolicy,
}

/// Run one suite and score it. A configured suite whose test file is missing is a failed
/// suite scored 0 without launching anything.
pub fn evaluate_suite<R: SuiteRunner>(
    runner: &R,
    task: &TaskConfig,
    target: &Target,
    kind: SuiteKind,
) -> SuiteEvaluation {
    let baseline = task.baseline(kind);
    let missing = match task.suite_path(kind) {
        Some(path) if path.is_file() => None,
        Some(path) => Some(format!("test file not found: {}", path.display())),
        None => Some(format!("no {kind} suite configured")),
    };

    match missing {
        None => {
            let result = runner.run_suite(task, target, kind);
            let score = score_suite(kind, &result, baseline);
            SuiteEvaluation { result, score }
        }
        Some(reason) => {
            warn!(%kind, %reason, "suite not run");
            let result = SuiteResult::not_run(reason.clone());
            let score = not_run_score(kind, &result, baseline, reason);
            SuiteEvaluation { result, score }
        }
    }
}

/// Every suite of the task, in canonical kind order.
pub fn evaluate_battery<R: SuiteRunner>(
    runner: &R,
    task: &TaskConfig,
    target: &Target,
) -> BTreeMap<SuiteKind, SuiteEvaluation> {
    task.kinds()
        .map(|kind| (kind, evaluate_suite(runner, task, target, kind)))
        .collect()
}

/// Raw measurements behind a set of suite scores, for variance reporting.
pub fn run_signals(suites: &BTreeMap<SuiteKind, SuiteEvaluation>) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (kind, eval) in suites {
        let r = &eval.result;
        match kind {
            SuiteKind::Performance => {
                out.insert("perf_elapsed_s".to_string(), r.elapsed_s);
            }
            SuiteKind::Resource => {
                out.insert(keys::AVG_MEMORY_MB.to_string(), r.avg_memory_mb);
                out.insert(keys::AVG_CPU_PERCENT.to_string(), r.avg_cpu_percent);
            }
            SuiteKind::Security => {
                if let Some(v) = r.metrics.get(keys::HIGH_RISK_COUNT) {
                    out.insert(keys::HIGH_RISK_COUNT.to_string(), *v);
                }
            }
            SuiteKind::Maintainability => {
                if let Some(v) = r.metrics.get(keys::MI_MIN) {
                    out.insert(keys::MI_MIN.to_string(), *v);
                }
            }
            SuiteKind::Robustness => {
                out.insert("robust_passed".to_string(), f64::from(r.counts.passed));
                out.insert("robust_total".to_string(), f64::from(r.counts.total));
            }
            SuiteKind::Functional => {}
        }
    }
    out
}

pub struct EvaluateCandidateUseCase<R: SuiteRunner, C: Clock> {
    runner: R,
    clock: C,
    tool: ToolInfo,
    gate: ImportGate,
}

impl<R: SuiteRunner, C: Clock> EvaluateCandidateUseCase<R, C> {
    pub fn new(runner: R, clock: C, tool: ToolInfo) -> Self {
        Self {
            runner,
            clock,
            tool,
            gate: ImportGate::default(),
        }
    }

    pub fn with_gate(mut self, gate: ImportGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn execute(&self, task: &TaskConfig, req: EvaluateRequest) -> anyhow::Result<CandidateEvaluation> {
        let started_at = self.clock.now_rfc3339();
        let root = &req.target.root;

        let gate = match req.gate {
            GatePolicy::Skip => {
                anyhow::ensure!(
                    root.is_dir(),
                    "candidate repository not found: {}",
                    root.display()
                );
                None
            }
            GatePolicy::Report | GatePolicy::Enforce => Some(
                self.gate
                    .analyze(root, &task.required_files)
                    .with_context(|| format!("import gate on {}", root.display()))?,
            ),
        };

        let rejected = req.gate == GatePolicy::Enforce && gate.as_ref().is_some_and(|g| !g.ok);
        let (record, suites) = if rejected {
            let issues = gate.as_ref().map_or(0, |g| g.issues.len());
            info!(candidate = %req.candidate, issues, "import gate failed; scoring zero");
            self.gate_rejection(task, issues)?
        } else {
            let suites = evaluate_battery(&self.runner, task, &req.target);
            let record = aggregate_scores(suites.values().map(|e| &e.score), &task.weights)
                .context("aggregate suite scores")?;
            (record, suites)
        };

        info!(
            task = %task.project,
            candidate = %req.candidate,
            functional = record.functional_score,
            non_functional = record.non_functional_score,
            "candidate evaluated"
        );

        Ok(CandidateEvaluation {
            schema: repograde_types::EVALUATION_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            task: task.project.clone(),
            candidate: req.candidate,
            started_at,
            ended_at: self.clock.now_rfc3339(),
            record,
            suites,
            gate,
        })
    }

    fn gate_rejection(
        &self,
        task: &TaskConfig,
        issues: usize,
    ) -> anyhow::Result<(ScoreRecord, BTreeMap<SuiteKind, SuiteEvaluation>)> {
        let reason = format!("import gate failed with {issues} issue(s)");
        let suites = task
            .kinds()
            .map(|kind| {
                let result = SuiteResult::not_run(reason.clone());
                let score = not_run_score(kind, &result, task.baseline(kind), reason.clone());
                (kind, SuiteEvaluation { result, score })
            })
            .collect();
        let record = zero_record(task.kinds(), &task.weights).context("build zero record")?;
        Ok((record, suites))
    }
}
