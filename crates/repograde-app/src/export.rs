//! Tabular export of evaluations and confidence reports to CSV or JSONL.

use repograde_types::{CandidateEvaluation, ConfidenceReport};
use serde::Serialize;
use std::str::FromStr;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// RFC 4180 CSV with a header row.
    Csv,
    /// One JSON object per line.
    Jsonl,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "jsonl" => Ok(ExportFormat::Jsonl),
            other => anyhow::bail!("unknown export format: {other}"),
        }
    }
}

/// The tables a confidence report flattens into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTable {
    RerunDetails,
    RerunSummary,
    BudgetDetails,
    BudgetSummary,
    NoiseDetails,
    NoiseSummary,
}

impl ConfidenceTable {
    pub const ALL: [ConfidenceTable; 6] = [
        ConfidenceTable::RerunDetails,
        ConfidenceTable::RerunSummary,
        ConfidenceTable::BudgetDetails,
        ConfidenceTable::BudgetSummary,
        ConfidenceTable::NoiseDetails,
        ConfidenceTable::NoiseSummary,
    ];

    /// Conventional file name without extension.
    pub fn file_stem(self) -> &'static str {
        match self {
            ConfidenceTable::RerunDetails => "reruns_details",
            ConfidenceTable::RerunSummary => "reruns_summary",
            ConfidenceTable::BudgetDetails => "budget_details",
            ConfidenceTable::BudgetSummary => "budget_summary",
            ConfidenceTable::NoiseDetails => "noise_details",
            ConfidenceTable::NoiseSummary => "noise_summary",
        }
    }
}

/// A flat record with a fixed column order.
trait ExportRow: Serialize {
    const HEADER: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

fn num(v: f64) -> String {
    format!("{v:.6}")
}

fn opt_num(v: Option<f64>) -> String {
    v.map_or(String::new(), num)
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteExportRow {
    pub task: String,
    pub candidate: String,
    pub suite: String,
    pub score: f64,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
    pub returncode: i32,
    pub elapsed_s: f64,
    pub avg_memory_mb: f64,
    pub avg_cpu_percent: f64,
    pub timed_out: bool,
}

impl ExportRow for SuiteExportRow {
    const HEADER: &'static [&'static str] = &[
        "task",
        "candidate",
        "suite",
        "score",
        "passed",
        "failed",
        "skipped",
        "total",
        "returncode",
        "elapsed_s",
        "avg_memory_mb",
        "avg_cpu_percent",
        "timed_out",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            csv_escape(&self.task),
            csv_escape(&self.candidate),
            csv_escape(&self.suite),
            num(self.score),
            self.passed.to_string(),
            self.failed.to_string(),
            self.skipped.to_string(),
            self.total.to_string(),
            self.returncode.to_string(),
            num(self.elapsed_s),
            num(self.avg_memory_mb),
            num(self.avg_cpu_percent),
            self.timed_out.to_string(),
        ]
    }
}

/// One scalar of one rerun (long form).
#[derive(Debug, Clone, Serialize)]
pub struct RerunExportRow {
    pub task: String,
    pub candidate: String,
    pub run_index: u32,
    pub metric: String,
    pub value: f64,
}

impl ExportRow for RerunExportRow {
    const HEADER: &'static [&'static str] = &["task", "candidate", "run_index", "metric", "value"];

    fn cells(&self) -> Vec<String> {
        vec![
            csv_escape(&self.task),
            csv_escape(&self.candidate),
            self.run_index.to_string(),
            csv_escape(&self.metric),
            num(self.value),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RerunSummaryExportRow {
    pub task: String,
    pub candidate: String,
    pub runs: u32,
    pub metric: String,
    pub mean: f64,
    pub std: f64,
    pub cv: f64,
    pub p05: f64,
    pub p95: f64,
}

impl ExportRow for RerunSummaryExportRow {
    const HEADER: &'static [&'static str] = &[
        "task", "candidate", "runs", "metric", "mean", "std", "cv", "p05", "p95",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            csv_escape(&self.task),
            csv_escape(&self.candidate),
            self.runs.to_string(),
            csv_escape(&self.metric),
            num(self.mean),
            num(self.std),
            num(self.cv),
            num(self.p05),
            num(self.p95),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetExportRow {
    pub task: String,
    pub ratio: f64,
    pub repeat: u32,
    pub spearman: f64,
    pub functional_spearman: f64,
    pub top1_reference: String,
    pub top1_sampled: String,
    pub top1_match: bool,
    pub flip_rate: f64,
}

impl ExportRow for BudgetExportRow {
    const HEADER: &'static [&'static str] = &[
        "task",
        "ratio",
        "repeat",
        "spearman",
        "functional_spearman",
        "top1_reference",
        "top1_sampled",
        "top1_match",
        "flip_rate",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            csv_escape(&self.task),
            num(self.ratio),
            self.repeat.to_string(),
            num(self.spearman),
            num(self.functional_spearman),
            csv_escape(&self.top1_reference),
            csv_escape(&self.top1_sampled),
            self.top1_match.to_string(),
            num(self.flip_rate),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetSummaryExportRow {
    pub task: String,
    pub ratio: f64,
    pub repeats: u32,
    pub spearman_mean: f64,
    pub spearman_p05: f64,
    pub spearman_p95: f64,
    pub functional_spearman_mean: f64,
    pub top1_stability: f64,
    pub flip_mean: f64,
    pub flip_p95: f64,
}

impl ExportRow for BudgetSummaryExportRow {
    const HEADER: &'static [&'static str] = &[
        "task",
        "ratio",
        "repeats",
        "spearman_mean",
        "spearman_p05",
        "spearman_p95",
        "functional_spearman_mean",
        "top1_stability",
        "flip_mean",
        "flip_p95",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            csv_escape(&self.task),
            num(self.ratio),
            self.repeats.to_string(),
            num(self.spearman_mean),
            num(self.spearman_p05),
            num(self.spearman_p95),
            num(self.functional_spearman_mean),
            num(self.top1_stability),
            num(self.flip_mean),
            num(self.flip_p95),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NoiseExportRow {
    pub task: String,
    pub condition: String,
    pub candidate: String,
    pub repeat: u32,
    pub performance: Option<f64>,
    pub resource: Option<f64>,
}

impl ExportRow for NoiseExportRow {
    const HEADER: &'static [&'static str] = &[
        "task",
        "condition",
        "candidate",
        "repeat",
        "performance",
        "resource",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            csv_escape(&self.task),
            csv_escape(&self.condition),
            csv_escape(&self.candidate),
            self.repeat.to_string(),
            opt_num(self.performance),
            opt_num(self.resource),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NoiseSummaryExportRow {
    pub task: String,
    pub workers: u32,
    pub repeats: u32,
    pub spearman: f64,
    pub top1_idle: String,
    pub top1_noisy: String,
    pub top1_flipped: bool,
    pub flip_rate: f64,
}

impl ExportRow for NoiseSummaryExportRow {
    const HEADER: &'static [&'static str] = &[
        "task",
        "workers",
        "repeats",
        "spearman",
        "top1_idle",
        "top1_noisy",
        "top1_flipped",
        "flip_rate",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            csv_escape(&self.task),
            self.workers.to_string(),
            self.repeats.to_string(),
            num(self.spearman),
            csv_escape(&self.top1_idle),
            csv_escape(&self.top1_noisy),
            self.top1_flipped.to_string(),
            num(self.flip_rate),
        ]
    }
}

/// Use case for flattening results into export formats.
pub struct ExportUseCase;

impl ExportUseCase {
    /// One row per suite of the evaluation, in canonical kind order.
    pub fn export_evaluation(eval: &CandidateEvaluation, format: ExportFormat) -> anyhow::Result<String> {
        let rows: Vec<SuiteExportRow> = eval
            .suites
            .iter()
            .map(|(kind, s)| SuiteExportRow {
                task: eval.task.clone(),
                candidate: eval.candidate.clone(),
                suite: kind.to_string(),
                score: s.score.score,
                passed: s.result.counts.passed,
                failed: s.result.counts.failed,
                skipped: s.result.counts.skipped,
                total: s.result.counts.total,
                returncode: s.result.returncode,
                elapsed_s: s.result.elapsed_s,
                avg_memory_mb: s.result.avg_memory_mb,
                avg_cpu_percent: s.result.avg_cpu_percent,
                timed_out: s.result.timed_out,
            })
            .collect();
        write_rows(&rows, format)
    }

    pub fn export_confidence(
        report: &ConfidenceReport,
        table: ConfidenceTable,
        format: ExportFormat,
    ) -> anyhow::Result<String> {
        match table {
            ConfidenceTable::RerunDetails => {
                let rows: Vec<RerunExportRow> = report
                    .rerun_details
                    .iter()
                    .flat_map(|d| {
                        d.result.scalars().into_iter().map(|(metric, value)| RerunExportRow {
                            task: d.task.clone(),
                            candidate: d.candidate.clone(),
                            run_index: d.run_index,
                            metric,
                            value,
                        })
                    })
                    .collect();
                write_rows(&rows, format)
            }
            ConfidenceTable::RerunSummary => {
                let rows: Vec<RerunSummaryExportRow> = report
                    .rerun
                    .iter()
                    .flat_map(|s| {
                        s.metrics.iter().map(|(metric, m)| RerunSummaryExportRow {
                            task: s.task.clone(),
                            candidate: s.candidate.clone(),
                            runs: s.runs,
                            metric: metric.clone(),
                            mean: m.mean,
                            std: m.std,
                            cv: m.cv,
                            p05: m.p05,
                            p95: m.p95,
                        })
                    })
                    .collect();
                write_rows(&rows, format)
            }
            ConfidenceTable::BudgetDetails => {
                let rows: Vec<BudgetExportRow> = report
                    .budget_details
                    .iter()
                    .map(|d| BudgetExportRow {
                        task: d.task.clone(),
                        ratio: d.ratio,
                        repeat: d.repeat,
                        spearman: d.spearman,
                        functional_spearman: d.functional_spearman,
                        top1_reference: d.top1_reference.clone().unwrap_or_default(),
                        top1_sampled: d.top1_sampled.clone().unwrap_or_default(),
                        top1_match: d.top1_match,
                        flip_rate: d.flip_rate,
                    })
                    .collect();
                write_rows(&rows, format)
            }
            ConfidenceTable::BudgetSummary => {
                let rows: Vec<BudgetSummaryExportRow> = report
                    .budget
                    .iter()
                    .map(|b| BudgetSummaryExportRow {
                        task: b.task.clone(),
                        ratio: b.ratio,
                        repeats: b.repeats,
                        spearman_mean: b.spearman_mean,
                        spearman_p05: b.spearman_p05,
                        spearman_p95: b.spearman_p95,
                        functional_spearman_mean: b.functional_spearman_mean,
                        top1_stability: b.top1_stability,
                        flip_mean: b.flip_mean,
                        flip_p95: b.flip_p95,
                    })
                    .collect();
                write_rows(&rows, format)
            }
            ConfidenceTable::NoiseDetails => {
                let rows: Vec<NoiseExportRow> = report
                    .noise_details
                    .iter()
                    .map(|d| NoiseExportRow {
                        task: d.task.clone(),
                        condition: d.condition.as_str().to_string(),
                        candidate: d.candidate.clone(),
                        repeat: d.repeat,
                        performance: d.performance,
                        resource: d.resource,
                    })
                    .collect();
                write_rows(&rows, format)
            }
            ConfidenceTable::NoiseSummary => {
                let rows: Vec<NoiseSummaryExportRow> = report
                    .noise
                    .iter()
                    .map(|n| NoiseSummaryExportRow {
                        task: n.task.clone(),
                        workers: n.workers,
                        repeats: n.repeats,
                        spearman: n.spearman,
                        top1_idle: n.top1_idle.clone().unwrap_or_default(),
                        top1_noisy: n.top1_noisy.clone().unwrap_or_default(),
                        top1_flipped: n.top1_flipped,
                        flip_rate: n.flip_rate,
                    })
                    .collect();
                write_rows(&rows, format)
            }
        }
    }
}

fn write_rows<T: ExportRow>(rows: &[T], format: ExportFormat) -> anyhow::Result<String> {
    let mut output = String::new();
    match format {
        ExportFormat::Csv => {
            output.push_str(&T::HEADER.join(","));
            output.push('\n');
            for row in rows {
                output.push_str(&row.cells().join(","));
                output.push('\n');
            }
        }
        ExportFormat::Jsonl => {
            for row in rows {
                output.push_str(&serde_json::to_string(row)?);
                output.push('\n');
            }
        }
    }
    Ok(output)
}

/// Quote a CSV field when it contains a delimiter, quote or line break (RFC 4180).
fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
