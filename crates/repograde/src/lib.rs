//! repograde: score generated Python repositories against a reference implementation.
//!
//! This crate re-exports the layered workspace crates under one name. The usual entry
//! points are [`load_task_config`], [`ImportGate`], [`EvaluateCandidateUseCase`] and
//! [`ConfidenceAnalyzer`].
//!
//! ```no_run
//! use repograde::{
//!     EvaluateCandidateUseCase, EvaluateRequest, GatePolicy, OsLauncher, PytestCommand,
//!     SupervisedSuiteRunner, SystemClock, Target, ToolInfo, load_task_config,
//! };
//!
//! let task = load_task_config("tasks/toolz/task.toml".as_ref())?;
//! let runner = SupervisedSuiteRunner::new(OsLauncher, PytestCommand::default());
//! let evaluate = EvaluateCandidateUseCase::new(runner, SystemClock, ToolInfo::current());
//! let request = EvaluateRequest {
//!     candidate: "candidate-a".into(),
//!     target: Target::generated("out/candidate-a"),
//!     gate: GatePolicy::Enforce,
//! };
//! let evaluation = evaluate.execute(&task, request)?;
//! println!("{:.3}", evaluation.record.non_functional_score);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use repograde_adapters as adapters;
pub use repograde_app as app;
pub use repograde_config as config;
pub use repograde_domain as domain;
pub use repograde_error as error;
pub use repograde_gate as gate;
pub use repograde_metrics as metrics;
pub use repograde_stats as stats;
pub use repograde_types as types;

pub use repograde_adapters::{
    CommandSpec, CpuBurner, LoadGenerator, LoadSession, NoLoad, OsLauncher, ProcessLauncher,
    SuperviseOptions, Supervisor,
};
pub use repograde_app::{
    BaselineMeasurement, Candidate, Clock, ConfidenceAnalyzer, ConfidenceTable,
    EvaluateCandidateUseCase, EvaluateRequest, ExportFormat, ExportUseCase, GatePolicy,
    MeasureBaselineUseCase, PytestCommand, SuiteRunner, SupervisedSuiteRunner, SystemClock,
    Target, render_confidence_markdown,
};
pub use repograde_config::{load_analysis_config, load_task_config};
pub use repograde_domain::{aggregate_scores, score_suite};
pub use repograde_error::RepogradeError;
pub use repograde_gate::{ImportGate, collect_issue_context, format_gate_report};
pub use repograde_metrics::{OutputProtocol, PytestText};
pub use repograde_types::*;
