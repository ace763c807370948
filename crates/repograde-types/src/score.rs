use crate::{SuiteKind, ToolInfo};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known baseline and metric keys.
pub mod keys {
    pub const HIGH_RISK_COUNT: &str = "high_risk_count";
    pub const MI_MIN: &str = "mi_min";
    pub const PERFORMANCE_SUITE_TIME_S: &str = "performance_suite_time_s";
    pub const AVG_MEMORY_MB: &str = "avg_memory_mb";
    pub const AVG_CPU_PERCENT: &str = "avg_cpu_percent";

    pub fn suite_time(kind: crate::SuiteKind) -> String {
        format!("{kind}_suite_time_s")
    }

    pub fn tests_total(kind: crate::SuiteKind) -> String {
        format!("{kind}_tests_total")
    }
}

/// Reference measurements for one suite kind.
///
/// Values may sit at the top level or inside a nested `metrics` table; lookups check the
/// top level first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BaselineEntry {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,

    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl BaselineEntry {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .get(key)
            .or_else(|| self.metrics.get(key))
            .copied()
    }

    /// Every key visible through [`BaselineEntry::get`], sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .keys()
            .chain(self.metrics.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

pub type BaselineMetrics = BTreeMap<SuiteKind, BaselineEntry>;

/// Baselines measured by running the suites against a reference implementation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BaselineReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub task: String,
    pub measured_at: String,
    pub baselines: BaselineMetrics,

    /// Suites that failed on the reference; their measurements are kept but suspect.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_suites: Vec<SuiteKind>,
}

/// Which rule produced a score, with the exact values it looked at.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ScoreBasis {
    PassRatio,
    HighRiskCount {
        baseline: Option<f64>,
        generated: Option<f64>,
    },
    MaintainabilityIndex {
        baseline: Option<f64>,
        generated: Option<f64>,
        ratio: Option<f64>,
    },
    SuiteTime {
        baseline_s: Option<f64>,
        actual_s: Option<f64>,
    },
    Footprint {
        baseline_memory_mb: Option<f64>,
        actual_memory_mb: Option<f64>,
        baseline_cpu_percent: Option<f64>,
        actual_cpu_percent: Option<f64>,
        cpu_used: bool,
    },
    NotRun {
        reason: String,
    },
}

/// Everything needed to recompute a score after the fact.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ScoreInputs {
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
    pub returncode: i32,
    pub timed_out: bool,
    pub failed_suite: bool,
    pub baseline_keys: Vec<String>,
    pub basis: ScoreBasis,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SuiteScore {
    pub kind: SuiteKind,
    pub score: f64,
    pub inputs: ScoreInputs,
}

/// Non-functional aggregation weights.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct ScoreWeights(pub BTreeMap<SuiteKind, f64>);

impl Default for ScoreWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (SuiteKind::Maintainability, 0.36),
            (SuiteKind::Security, 0.24),
            (SuiteKind::Robustness, 0.16),
            (SuiteKind::Performance, 0.12),
            (SuiteKind::Resource, 0.12),
        ]))
    }
}

impl ScoreWeights {
    pub fn get(&self, kind: SuiteKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or(0.0)
    }
}

/// Aggregate score for one candidate run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ScoreRecord {
    pub functional_score: f64,
    pub non_functional_score: f64,

    /// Subscores of the non-functional kinds present in the task.
    pub subscores: BTreeMap<SuiteKind, f64>,

    /// Weights actually applied (only present kinds).
    pub weights: BTreeMap<SuiteKind, f64>,
}

impl ScoreRecord {
    pub fn subscore(&self, kind: SuiteKind) -> f64 {
        self.subscores.get(&kind).copied().unwrap_or(0.0)
    }
}
