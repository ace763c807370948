//! Task document loading for repograde.
//!
//! A task document is TOML or JSON. It is parsed into the loosely-shaped
//! [`TaskConfigFile`] and validated exactly once into an immutable [`TaskConfig`];
//! nothing downstream re-checks presence or types.

use repograde_error::{RepogradeError, Result};
use repograde_types::{AnalysisConfig, BaselineEntry, ScoreWeights, SuiteKind, TaskConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// A timeout written either as seconds or as a humantime string such as `"90s"`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum TimeoutValue {
    Seconds(f64),
    Text(String),
}

impl TimeoutValue {
    pub fn to_duration(&self) -> Result<Duration> {
        let d = match self {
            TimeoutValue::Seconds(s) => {
                if !s.is_finite() || *s <= 0.0 {
                    return Err(RepogradeError::config(format!(
                        "timeout must be a positive number of seconds, got {s}"
                    )));
                }
                Duration::try_from_secs_f64(*s).map_err(|e| {
                    RepogradeError::config(format!("timeout of {s} seconds is out of range: {e}"))
                })?
            }
            TimeoutValue::Text(text) => parse_duration(text)?,
        };
        if d.is_zero() {
            return Err(RepogradeError::config("timeout must be greater than zero"));
        }
        Ok(d)
    }
}

/// Parse `"30"` as seconds, anything else via humantime (`"2m"`, `"1500ms"`).
pub fn parse_duration(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    if let Ok(secs) = trimmed.parse::<f64>() {
        return TimeoutValue::Seconds(secs).to_duration();
    }
    humantime::parse_duration(trimmed)
        .map_err(|e| RepogradeError::config(format!("invalid duration {trimmed:?}: {e}")))
}

/// On-disk shape of a task document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TaskConfigFile {
    pub project: Option<String>,
    pub package: Option<String>,

    /// Directory suite paths are relative to (default: `tests` next to the document).
    pub tests_dir: Option<String>,

    /// Suite kind -> test file.
    pub test_suite: BTreeMap<String, String>,

    /// Suite kind -> baseline values.
    pub baseline_metrics: BTreeMap<String, BaselineEntry>,

    /// `default` plus optional per-kind overrides.
    pub timeouts: BTreeMap<String, TimeoutValue>,

    pub required_files: Vec<String>,

    pub reference_repository: Option<String>,

    /// Overrides of the non-functional weights.
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }
}

impl TaskConfigFile {
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self> {
        Ok(match format {
            ConfigFormat::Toml => toml::from_str(text)?,
            ConfigFormat::Json => serde_json::from_str(text)?,
        })
    }

    /// Validate and resolve paths against `base_dir` (the document's directory).
    pub fn validate(self, base_dir: &Path) -> Result<TaskConfig> {
        let project = self
            .project
            .or_else(|| self.package.clone())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| RepogradeError::config("task needs a `project` or `package` name"))?;
        let package = self
            .package
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| project.clone());

        let mut task = TaskConfig::new(project, package);

        let tests_dir = resolve(base_dir, self.tests_dir.as_deref().unwrap_or("tests"));
        for (kind, rel) in self.test_suite {
            let kind = parse_kind(&kind, "test_suite")?;
            if rel.trim().is_empty() {
                return Err(RepogradeError::config(format!(
                    "test_suite.{kind} must not be empty"
                )));
            }
            task.suites.insert(kind, resolve(&tests_dir, &rel));
        }

        for (kind, entry) in self.baseline_metrics {
            let kind = parse_kind(&kind, "baseline_metrics")?;
            task.baselines.insert(kind, entry);
        }

        for (key, value) in self.timeouts {
            let d = value.to_duration().map_err(|e| {
                RepogradeError::config(format!("timeouts.{key}: {e}"))
            })?;
            if key == "default" {
                task.default_timeout = d;
            } else {
                task.timeouts.insert(parse_kind(&key, "timeouts")?, d);
            }
        }

        if !self.weights.is_empty() {
            let mut weights = ScoreWeights::default();
            for (kind, w) in self.weights {
                let kind = parse_kind(&kind, "weights")?;
                if !kind.is_non_functional() {
                    return Err(RepogradeError::config(
                        "weights apply to non-functional suites only",
                    ));
                }
                if !w.is_finite() || w < 0.0 {
                    return Err(RepogradeError::config(format!(
                        "weights.{kind} must be a non-negative number, got {w}"
                    )));
                }
                weights.0.insert(kind, w);
            }
            task.weights = weights;
        }

        task.required_files = self.required_files;
        task.reference_root = self
            .reference_repository
            .as_deref()
            .map(|p| resolve(base_dir, p));

        debug!(
            project = %task.project,
            suites = task.suites.len(),
            "validated task config"
        );
        Ok(task)
    }
}

fn parse_kind(raw: &str, section: &str) -> Result<SuiteKind> {
    raw.parse::<SuiteKind>()
        .map_err(|e| RepogradeError::config(format!("{section}: {e}")))
}

fn resolve(base: &Path, p: &str) -> PathBuf {
    let path = Path::new(p);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Load and validate a task document from disk.
pub fn load_task_config(path: &Path) -> Result<TaskConfig> {
    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| RepogradeError::UnsupportedFormat(path.to_path_buf()))?;
    let text = std::fs::read_to_string(path).map_err(|e| RepogradeError::io(path, e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    TaskConfigFile::parse(&text, format)?.validate(base_dir)
}

/// Load protocol settings; a missing file yields the defaults.
pub fn load_analysis_config(path: &Path) -> Result<AnalysisConfig> {
    if !path.exists() {
        return Ok(AnalysisConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|e| RepogradeError::io(path, e))?;
    let cfg: AnalysisConfig = match ConfigFormat::from_path(path) {
        Some(ConfigFormat::Json) => serde_json::from_str(&text)?,
        Some(ConfigFormat::Toml) | None => toml::from_str(&text)?,
    };
    if cfg.budget_ratios.iter().any(|r| !(*r > 0.0 && *r <= 1.0)) {
        return Err(RepogradeError::config(
            "budget_ratios must lie in (0, 1]",
        ));
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = r#"
project = "toolz"
package = "toolz"
required_files = ["toolz/__init__.py"]
reference_repository = "reference"

[test_suite]
functional = "test_functional.py"
security = "test_security.py"
resource = "/abs/test_resource.py"

[timeouts]
default = 45
performance = "2m"

[baseline_metrics.security]
high_risk_count = 0

[baseline_metrics.resource]
avg_memory_mb = 31.5
avg_cpu_percent = 80
"#;

    #[test]
    fn parses_and_resolves_paths() {
        let task = TaskConfigFile::parse(SAMPLE, ConfigFormat::Toml)
            .unwrap()
            .validate(Path::new("/tasks/toolz"))
            .unwrap();

        assert_eq!(task.project, "toolz");
        assert_eq!(
            task.suite_path(SuiteKind::Functional).unwrap(),
            Path::new("/tasks/toolz/tests/test_functional.py")
        );
        assert_eq!(
            task.suite_path(SuiteKind::Resource).unwrap(),
            Path::new("/abs/test_resource.py")
        );
        assert_eq!(task.default_timeout, Duration::from_secs(45));
        assert_eq!(
            task.timeout_for(SuiteKind::Performance),
            Duration::from_secs(120)
        );
        assert_eq!(
            task.baseline(SuiteKind::Resource).get("avg_cpu_percent"),
            Some(80.0)
        );
        assert_eq!(
            task.reference_root.as_deref(),
            Some(Path::new("/tasks/toolz/reference"))
        );
        assert_eq!(task.env.target_var, "TOOLZ_TARGET");
    }

    #[test]
    fn json_documents_are_accepted() {
        let json = r#"{
            "package": "mini",
            "test_suite": {"functional": "t.py"},
            "timeouts": {"default": "10s"}
        }"#;
        let task = TaskConfigFile::parse(json, ConfigFormat::Json)
            .unwrap()
            .validate(Path::new("/x"))
            .unwrap();
        assert_eq!(task.project, "mini");
        assert_eq!(task.default_timeout, Duration::from_secs(10));
    }

    #[test]
    fn unknown_suite_kind_is_rejected() {
        let raw = TaskConfigFile {
            project: Some("p".into()),
            test_suite: BTreeMap::from([("fuzzing".to_string(), "t.py".to_string())]),
            ..Default::default()
        };
        let err = raw.validate(Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("fuzzing"), "got: {err}");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let raw = TaskConfigFile {
            project: Some("p".into()),
            timeouts: BTreeMap::from([("default".to_string(), TimeoutValue::Seconds(0.0))]),
            ..Default::default()
        };
        assert!(raw.validate(Path::new("/")).is_err());
    }

    #[test]
    fn missing_names_are_rejected() {
        assert!(TaskConfigFile::default().validate(Path::new("/")).is_err());
    }

    #[test]
    fn weights_override_defaults() {
        let raw = TaskConfigFile {
            project: Some("p".into()),
            weights: BTreeMap::from([("security".to_string(), 0.5)]),
            ..Default::default()
        };
        let task = raw.validate(Path::new("/")).unwrap();
        assert_eq!(task.weights.get(SuiteKind::Security), 0.5);
        assert_eq!(task.weights.get(SuiteKind::Maintainability), 0.36);
    }

    #[test]
    fn functional_weight_is_rejected() {
        let raw = TaskConfigFile {
            project: Some("p".into()),
            weights: BTreeMap::from([("functional".to_string(), 1.0)]),
            ..Default::default()
        };
        assert!(raw.validate(Path::new("/")).is_err());
    }

    #[test]
    fn load_from_disk_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let task = load_task_config(&path).unwrap();
        assert_eq!(
            task.suite_path(SuiteKind::Security).unwrap(),
            dir.path().join("tests").join("test_security.py")
        );

        let bad = dir.path().join("task.yaml");
        std::fs::write(&bad, "x: 1").unwrap();
        assert!(matches!(
            load_task_config(&bad),
            Err(RepogradeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn analysis_config_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_analysis_config(&dir.path().join("none.toml")).unwrap();
        assert_eq!(cfg, AnalysisConfig::default());
    }

    #[test]
    fn analysis_config_rejects_bad_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.toml");
        std::fs::write(&path, "budget_ratios = [0.5, 1.5]\n").unwrap();
        assert!(load_analysis_config(&path).is_err());
    }

    #[test]
    fn parse_duration_accepts_both_forms() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1e300").is_err());
    }

    proptest! {
        #[test]
        fn positive_seconds_round_trip(secs in 1u64..100_000) {
            let d = TimeoutValue::Seconds(secs as f64).to_duration().unwrap();
            prop_assert_eq!(d, Duration::from_secs(secs));
        }

        #[test]
        fn negative_seconds_always_fail(secs in -1e9f64..=0.0) {
            prop_assert!(TimeoutValue::Seconds(secs).to_duration().is_err());
        }
    }
}
