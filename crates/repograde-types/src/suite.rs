use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Return code recorded for a suite that was killed at its deadline.
pub const TIMEOUT_RETURNCODE: i32 = 124;

/// Evaluation category of a test suite.
///
/// Declaration order is the canonical order suites are run and reported in.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    Functional,
    Performance,
    Resource,
    Robustness,
    Security,
    Maintainability,
}

impl SuiteKind {
    pub const ALL: [SuiteKind; 6] = [
        SuiteKind::Functional,
        SuiteKind::Performance,
        SuiteKind::Resource,
        SuiteKind::Robustness,
        SuiteKind::Security,
        SuiteKind::Maintainability,
    ];

    pub const NON_FUNCTIONAL: [SuiteKind; 5] = [
        SuiteKind::Performance,
        SuiteKind::Resource,
        SuiteKind::Robustness,
        SuiteKind::Security,
        SuiteKind::Maintainability,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SuiteKind::Functional => "functional",
            SuiteKind::Performance => "performance",
            SuiteKind::Resource => "resource",
            SuiteKind::Robustness => "robustness",
            SuiteKind::Security => "security",
            SuiteKind::Maintainability => "maintainability",
        }
    }

    pub fn is_non_functional(self) -> bool {
        self != SuiteKind::Functional
    }

    /// Prefix of the structured metric line this suite prints, if any.
    pub fn metric_prefix(self) -> Option<&'static str> {
        match self {
            SuiteKind::Security => Some("SECURITY_METRICS"),
            SuiteKind::Maintainability => Some("MAINT_METRICS"),
            _ => None,
        }
    }

    /// Suites whose metric lines are printed by the tests themselves need
    /// output capturing disabled in the test runner.
    pub fn needs_uncaptured_output(self) -> bool {
        self.metric_prefix().is_some()
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown suite kind: {0:?}")]
pub struct UnknownSuiteKind(pub String);

impl FromStr for SuiteKind {
    type Err = UnknownSuiteKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SuiteKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| UnknownSuiteKind(s.to_string()))
    }
}

/// Test outcome counts as reported by the test runner.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
}

impl TestCounts {
    pub fn single_failure() -> Self {
        Self {
            passed: 0,
            failed: 1,
            skipped: 0,
            total: 1,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.passed == 0 && self.failed == 0 && self.skipped == 0 && self.total == 0
    }

    pub fn outcome_sum(&self) -> u32 {
        self.passed + self.failed + self.skipped
    }
}

/// One supervised execution of a suite.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SuiteResult {
    #[serde(flatten)]
    pub counts: TestCounts,

    pub returncode: i32,

    /// Wall time from launch to exit (or kill).
    pub elapsed_s: f64,

    /// Mean resident memory of the whole process tree across samples.
    pub avg_memory_mb: f64,

    /// Mean CPU utilization of the whole process tree across samples.
    pub avg_cpu_percent: f64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,

    #[serde(default)]
    pub timed_out: bool,

    /// Combined stdout/stderr as captured.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,

    /// Why the suite could not run, when it could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuiteResult {
    /// The command never started.
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self {
            counts: TestCounts::single_failure(),
            returncode: 1,
            elapsed_s: 0.0,
            avg_memory_mb: 0.0,
            avg_cpu_percent: 0.0,
            metrics: BTreeMap::new(),
            timed_out: false,
            output: String::new(),
            error: Some(message.into()),
        }
    }

    /// The suite is configured but there is nothing to run.
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self::launch_failure(reason)
    }

    /// Nonzero exit (timeouts included) or at least one failed test.
    pub fn is_failed(&self) -> bool {
        self.counts.failed > 0 || self.returncode != 0
    }

    /// Keep downstream ratios defined: a failed suite always reports at least one test.
    pub fn enforce_failure_floor(&mut self) {
        if self.is_failed() && self.counts.total == 0 {
            self.counts.failed = self.counts.failed.max(1);
            self.counts.total = self.counts.outcome_sum();
        }
    }
}
