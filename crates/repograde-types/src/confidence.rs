use crate::{GateOutcome, ScoreRecord, SuiteKind, SuiteResult, SuiteScore, ToolInfo};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One suite as it was run and scored.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SuiteEvaluation {
    pub result: SuiteResult,
    pub score: SuiteScore,
}

/// Full record of evaluating one candidate repository against one task.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CandidateEvaluation {
    pub schema: String,
    pub tool: ToolInfo,
    pub task: String,
    pub candidate: String,
    pub started_at: String,
    pub ended_at: String,
    pub record: ScoreRecord,
    pub suites: BTreeMap<SuiteKind, SuiteEvaluation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateOutcome>,
}

/// A score record reduced to scalars, plus the raw signals that fed it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RunResult {
    pub functional: f64,
    pub non_functional: f64,
    pub subscores: BTreeMap<SuiteKind, f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signals: BTreeMap<String, f64>,
}

impl RunResult {
    pub fn from_record(record: &ScoreRecord, signals: BTreeMap<String, f64>) -> Self {
        Self {
            functional: record.functional_score,
            non_functional: record.non_functional_score,
            subscores: record.subscores.clone(),
            signals,
        }
    }

    pub fn subscore(&self, kind: SuiteKind) -> f64 {
        self.subscores.get(&kind).copied().unwrap_or(0.0)
    }

    /// Every scalar under a stable name: `functional`, `non_functional`,
    /// `sub_<kind>`, then the raw signals.
    pub fn scalars(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        out.insert("functional".to_string(), self.functional);
        out.insert("non_functional".to_string(), self.non_functional);
        for (kind, v) in &self.subscores {
            out.insert(format!("sub_{kind}"), *v);
        }
        for (k, v) in &self.signals {
            out.insert(k.clone(), *v);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
    pub cv: f64,
    pub p05: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RerunDetailRow {
    pub task: String,
    pub candidate: String,
    pub run_index: u32,
    pub result: RunResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RerunSummary {
    pub task: String,
    pub candidate: String,
    pub runs: u32,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl RerunSummary {
    pub fn mean_of(&self, metric: &str) -> f64 {
        self.metrics.get(metric).map(|m| m.mean).unwrap_or(0.0)
    }

    pub fn cv_of(&self, metric: &str) -> f64 {
        self.metrics.get(metric).map(|m| m.cv).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BudgetDetailRow {
    pub task: String,
    pub ratio: f64,
    pub repeat: u32,
    pub spearman: f64,
    pub functional_spearman: f64,
    pub top1_reference: Option<String>,
    pub top1_sampled: Option<String>,
    pub top1_match: bool,
    pub flip_rate: f64,
    pub scores: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BudgetSummary {
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

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoiseCondition {
    Idle,
    Noisy,
}

impl NoiseCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            NoiseCondition::Idle => "idle",
            NoiseCondition::Noisy => "noisy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NoiseDetailRow {
    pub task: String,
    pub condition: NoiseCondition,
    pub candidate: String,
    pub repeat: u32,
    pub performance: Option<f64>,
    pub resource: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NoiseSummary {
    pub task: String,
    pub workers: u32,
    pub repeats: u32,
    pub spearman: f64,
    pub top1_idle: Option<String>,
    pub top1_noisy: Option<String>,
    pub top1_flipped: bool,
    pub flip_rate: f64,
    pub idle_scores: BTreeMap<String, f64>,
    pub noisy_scores: BTreeMap<String, f64>,
}

/// Everything one confidence analysis pass produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ConfidenceReport {
    pub schema: String,
    pub rerun_details: Vec<RerunDetailRow>,
    pub rerun: Vec<RerunSummary>,
    pub budget_details: Vec<BudgetDetailRow>,
    pub budget: Vec<BudgetSummary>,
    pub noise_details: Vec<NoiseDetailRow>,
    pub noise: Vec<NoiseSummary>,
}

/// Knobs for the confidence protocols.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub reruns: u32,
    pub budget_ratios: Vec<f64>,
    pub budget_repeats: u32,
    pub noise_repeats: u32,
    pub noise_workers: u32,
    pub seed: u64,
    pub sample_interval_ms: u64,
    pub kill_grace_ms: u64,

    /// Load workers live at least this long, or the longest suite timeout if larger.
    pub min_load_lifetime_ms: u64,

    pub log_dir: PathBuf,
    pub python: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reruns: 5,
            budget_ratios: vec![0.25, 0.5, 0.75, 1.0],
            budget_repeats: 30,
            noise_repeats: 8,
            noise_workers: 2,
            seed: 1234,
            sample_interval_ms: 100,
            kill_grace_ms: 2000,
            min_load_lifetime_ms: 30_000,
            log_dir: PathBuf::from("logs"),
            python: "python".to_string(),
        }
    }
}
