//! Test runner command lines.

use repograde_types::SuiteKind;
use std::path::Path;

/// Builds `python -m pytest ...` argument vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PytestCommand {
    python: String,
}

impl Default for PytestCommand {
    fn default() -> Self {
        Self::new("python")
    }
}

impl PytestCommand {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    fn base(&self) -> Vec<String> {
        vec![self.python.clone(), "-m".to_string(), "pytest".to_string()]
    }

    /// Whole suite. Suites that print metric lines run with capturing disabled.
    pub fn suite(&self, kind: SuiteKind, test_file: &Path) -> Vec<String> {
        let mut argv = self.base();
        argv.push(test_file.to_string_lossy().into_owned());
        argv.push("-q".to_string());
        if kind.needs_uncaptured_output() {
            argv.push("-s".to_string());
        }
        argv
    }

    /// Listed ids are relative to the test file's directory so [`Self::cases`] can run them
    /// from there, whatever ini files sit further up the tree.
    pub fn collect(&self, test_file: &Path) -> Vec<String> {
        let mut argv = self.base();
        argv.push(test_file.to_string_lossy().into_owned());
        argv.push("--collect-only".to_string());
        argv.push("-q".to_string());
        argv.push(rootdir(test_file));
        argv
    }

    /// Only the given test ids, as listed by [`Self::collect`] for the same file.
    pub fn cases(&self, test_file: &Path, ids: &[String]) -> Vec<String> {
        let mut argv = self.base();
        argv.extend(ids.iter().cloned());
        argv.push("-q".to_string());
        argv.push(rootdir(test_file));
        argv
    }
}

fn rootdir(test_file: &Path) -> String {
    let dir = test_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    format!("--rootdir={}", dir.display())
}
