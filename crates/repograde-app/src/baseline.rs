//! Measuring baselines against the reference implementation.

use crate::Clock;
use crate::runner::{SuiteRunner, Target};
use repograde_types::{BaselineReport, SuiteKind, TaskConfig, ToolInfo, keys};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct BaselineMeasurement {
    /// Reference repository; falls back to the task's own reference root.
    pub root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

pub struct MeasureBaselineUseCase<R: SuiteRunner, C: Clock> {
    runner: R,
    clock: C,
    tool: ToolInfo,
}

impl<R: SuiteRunner, C: Clock> MeasureBaselineUseCase<R, C> {
    pub fn new(runner: R, clock: C, tool: ToolInfo) -> Self {
        Self {
            runner,
            clock,
            tool,
        }
    }

    /// Run every suite with a test file against the reference and record its measurements.
    ///
    /// Existing baseline values the run does not produce are kept.
    pub fn execute(&self, task: &TaskConfig, req: BaselineMeasurement) -> anyhow::Result<BaselineReport> {
        let root = req
            .root
            .or_else(|| task.reference_root.clone())
            .ok_or_else(|| anyhow::anyhow!("task {} has no reference repository", task.project))?;
        anyhow::ensure!(
            root.is_dir(),
            "reference repository not found: {}",
            root.display()
        );

        let mut target = Target::reference(&root);
        target.log_dir = req.log_dir;

        let measured_at = self.clock.now_rfc3339();
        let mut baselines = task.baselines.clone();
        let mut failed_suites = Vec::new();

        for kind in task.kinds() {
            if !task.suite_path(kind).is_some_and(|p| p.is_file()) {
                warn!(%kind, "no test file; baseline not measured");
                continue;
            }

            let result = self.runner.run_suite(task, &target, kind);
            if result.is_failed() {
                warn!(
                    %kind,
                    returncode = result.returncode,
                    failed = result.counts.failed,
                    "reference suite failed"
                );
                failed_suites.push(kind);
            }

            let entry = baselines.entry(kind).or_default();
            entry
                .values
                .insert(keys::suite_time(kind), result.elapsed_s);
            entry
                .values
                .insert(keys::tests_total(kind), f64::from(result.counts.total));
            match kind {
                SuiteKind::Resource => {
                    entry
                        .values
                        .insert(keys::AVG_MEMORY_MB.to_string(), result.avg_memory_mb);
                    entry
                        .values
                        .insert(keys::AVG_CPU_PERCENT.to_string(), result.avg_cpu_percent);
                }
                SuiteKind::Security | SuiteKind::Maintainability if !result.metrics.is_empty() => {
                    entry.metrics = result.metrics.clone();
                }
                _ => {}
            }
            info!(%kind, elapsed_s = result.elapsed_s, total = result.counts.total, "baseline measured");
        }

        Ok(BaselineReport {
            schema: repograde_types::BASELINE_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            task: task.project.clone(),
            measured_at,
            baselines,
            failed_suites,
        })
    }
}
