use crate::{BaselineEntry, BaselineMetrics, ScoreWeights, SuiteKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SUITE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REPO_ROOT_VAR: &str = "RACB_REPO_ROOT";
pub const DEFAULT_PACKAGE_VAR: &str = "RACB_PACKAGE_NAME";

/// Which implementation the test suites should import.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Generated,
    Reference,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Generated => "generated",
            Variant::Reference => "reference",
        }
    }
}

/// Names of the environment variables handed to every suite process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    pub repo_root_var: String,
    pub package_var: String,
    pub target_var: String,
}

impl TargetEnv {
    pub fn for_project(project: &str) -> Self {
        let upper: String = project
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Self {
            repo_root_var: DEFAULT_REPO_ROOT_VAR.to_string(),
            package_var: DEFAULT_PACKAGE_VAR.to_string(),
            target_var: format!("{upper}_TARGET"),
        }
    }
}

/// Validated task description. Built once by the config loader and then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    /// Short project identifier, also used to derive the variant variable name.
    pub project: String,

    /// Import name of the package under test.
    pub package: String,

    /// Absolute test file per suite kind.
    pub suites: BTreeMap<SuiteKind, PathBuf>,

    pub baselines: BaselineMetrics,

    pub default_timeout: Duration,
    pub timeouts: BTreeMap<SuiteKind, Duration>,

    /// Paths (relative to a candidate root) that must exist.
    pub required_files: Vec<String>,

    /// Trusted implementation used to measure baselines.
    pub reference_root: Option<PathBuf>,

    pub weights: ScoreWeights,
    pub env: TargetEnv,
}

impl TaskConfig {
    /// A task with no suites; used as a starting point by loaders and tests.
    pub fn new(project: impl Into<String>, package: impl Into<String>) -> Self {
        let project = project.into();
        let env = TargetEnv::for_project(&project);
        Self {
            project,
            package: package.into(),
            suites: BTreeMap::new(),
            baselines: BTreeMap::new(),
            default_timeout: DEFAULT_SUITE_TIMEOUT,
            timeouts: BTreeMap::new(),
            required_files: Vec::new(),
            reference_root: None,
            weights: ScoreWeights::default(),
            env,
        }
    }

    pub fn has(&self, kind: SuiteKind) -> bool {
        self.suites.contains_key(&kind)
    }

    pub fn suite_path(&self, kind: SuiteKind) -> Option<&Path> {
        self.suites.get(&kind).map(PathBuf::as_path)
    }

    pub fn kinds(&self) -> impl Iterator<Item = SuiteKind> + '_ {
        self.suites.keys().copied()
    }

    pub fn non_functional_kinds(&self) -> impl Iterator<Item = SuiteKind> + '_ {
        self.kinds().filter(|k| k.is_non_functional())
    }

    pub fn timeout_for(&self, kind: SuiteKind) -> Duration {
        self.timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    pub fn baseline(&self, kind: SuiteKind) -> &BaselineEntry {
        static EMPTY: std::sync::OnceLock<BaselineEntry> = std::sync::OnceLock::new();
        self.baselines
            .get(&kind)
            .unwrap_or_else(|| EMPTY.get_or_init(BaselineEntry::default))
    }

    /// Environment for one suite process: variant selector, candidate root, package name,
    /// and the candidate root prepended to `PYTHONPATH`.
    pub fn suite_env(
        &self,
        repo_root: &Path,
        variant: Variant,
        inherited_pythonpath: Option<&str>,
    ) -> Vec<(String, String)> {
        let root = repo_root.to_string_lossy().to_string();
        let pythonpath = match inherited_pythonpath {
            Some(existing) if !existing.is_empty() => {
                let sep = if cfg!(windows) { ';' } else { ':' };
                format!("{root}{sep}{existing}")
            }
            _ => root.clone(),
        };
        vec![
            (self.env.target_var.clone(), variant.as_str().to_string()),
            (self.env.repo_root_var.clone(), root),
            (self.env.package_var.clone(), self.package.clone()),
            ("PYTHONPATH".to_string(), pythonpath),
        ]
    }
}
