//! Application layer for repograde.
//!
//! The app layer coordinates adapters, the import gate and the scoring domain.
//! It does not parse CLI flags and the only files it touches are suite logs.

mod baseline;
mod command;
mod confidence;
mod evaluate;
mod export;
mod report;
mod runner;

#[cfg(test)]
mod testing;

pub use baseline::{BaselineMeasurement, MeasureBaselineUseCase};
pub use command::PytestCommand;
pub use confidence::{Candidate, ConfidenceAnalyzer, summarize_runs};
pub use evaluate::{
    EvaluateCandidateUseCase, EvaluateRequest, GatePolicy, evaluate_battery, evaluate_suite,
    run_signals,
};
pub use export::{
    BudgetExportRow, BudgetSummaryExportRow, ConfidenceTable, ExportFormat, ExportUseCase,
    NoiseExportRow, NoiseSummaryExportRow, RerunExportRow, RerunSummaryExportRow, SuiteExportRow,
};
pub use report::render_confidence_markdown;
pub use runner::{SuiteRunner, SupervisedSuiteRunner, Target};

pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}
