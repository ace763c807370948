use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum GateIssueKind {
    SyntaxError,
    EmptyModule,
    MissingModule,
    MissingSymbol,
    MissingInit,
    ImportCycle,
    MissingRequiredFile,
    EmptyRequiredFile,
}

impl GateIssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GateIssueKind::SyntaxError => "syntax_error",
            GateIssueKind::EmptyModule => "empty_module",
            GateIssueKind::MissingModule => "missing_module",
            GateIssueKind::MissingSymbol => "missing_symbol",
            GateIssueKind::MissingInit => "missing_init",
            GateIssueKind::ImportCycle => "import_cycle",
            GateIssueKind::MissingRequiredFile => "missing_required_file",
            GateIssueKind::EmptyRequiredFile => "empty_required_file",
        }
    }
}

impl fmt::Display for GateIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural finding about a candidate repository.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GateIssue {
    pub kind: GateIssueKind,
    pub message: String,

    /// File the issue points at, relative to the repository root when possible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl GateIssue {
    pub fn new(kind: GateIssueKind, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            kind,
            message: message.into(),
            path,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GateOutcome {
    pub ok: bool,
    pub issues: Vec<GateIssue>,
}

impl GateOutcome {
    pub fn from_issues(issues: Vec<GateIssue>) -> Self {
        Self {
            ok: issues.is_empty(),
            issues,
        }
    }

    pub fn counts_by_kind(&self) -> BTreeMap<GateIssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }
}
