//! Static import gate for candidate Python repositories.
//!
//! [`ImportGate::analyze`] discovers every module, parses each one once, and cross-checks
//! the internal import graph: missing modules, missing symbols, missing package
//! initializers, empty modules, syntax errors and cycles. Findings are data
//! ([`GateIssue`]); only a missing repository root is an error.
//!
//! The gate reads files and nothing else, so concurrent runs on independent roots are fine.

mod discover;
mod graph;
mod module;
mod report;

pub use discover::{NESTED_SOURCE_DIR, SourceFile, discover, module_name};
pub use graph::import_cycles;
pub use module::{FromImport, InternalRoots, ModuleInfo, is_empty_source, resolve_import};
pub use report::{
    DEFAULT_CONTEXT_CHARS, DEFAULT_CONTEXT_FILES, DEFAULT_MAX_REPORT_ITEMS, collect_issue_context,
    format_gate_report,
};

use rayon::prelude::*;
use repograde_error::RepogradeError;
use repograde_types::{GateIssue, GateIssueKind, GateOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ImportGate {
    check_cycles: bool,
    allow_empty_init: bool,
}

impl Default for ImportGate {
    fn default() -> Self {
        Self {
            check_cycles: true,
            allow_empty_init: false,
        }
    }
}

impl ImportGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_cycles(mut self, on: bool) -> Self {
        self.check_cycles = on;
        self
    }

    /// Accept blank `__init__.py` files instead of reporting them as empty modules.
    pub fn allow_empty_init(mut self, on: bool) -> Self {
        self.allow_empty_init = on;
        self
    }

    pub fn analyze(&self, repo_root: &Path, required: &[String]) -> Result<GateOutcome, RepogradeError> {
        if !repo_root.is_dir() {
            return Err(RepogradeError::RepoRootMissing(repo_root.to_path_buf()));
        }

        let files = discover(repo_root);
        let roots = InternalRoots::from_modules(files.keys());
        let modules: BTreeMap<String, ModuleInfo> = files
            .into_par_iter()
            .map(|(name, file)| (name.clone(), ModuleInfo::load(name, file, &roots)))
            .collect();
        debug!(root = %repo_root.display(), modules = modules.len(), "modules parsed");

        let mut issues = Vec::new();
        issues.extend(self.module_issues(&modules));
        issues.extend(required_file_issues(repo_root, required));
        issues.extend(cross_module_issues(&modules, &roots));
        issues.extend(missing_init_issues(repo_root, &modules));
        if self.check_cycles {
            issues.extend(cycle_issues(&modules));
        }

        let outcome = GateOutcome::from_issues(issues);
        info!(
            root = %repo_root.display(),
            ok = outcome.ok,
            issues = outcome.issues.len(),
            "import gate finished"
        );
        Ok(outcome)
    }

    fn module_issues(&self, modules: &BTreeMap<String, ModuleInfo>) -> Vec<GateIssue> {
        let mut issues = Vec::new();
        for m in modules.values() {
            let path = Some(m.file.rel.clone());
            if let Some(err) = &m.syntax_error {
                issues.push(GateIssue::new(
                    GateIssueKind::SyntaxError,
                    format!("{} has syntax error: {} (line {})", m.name, err.message, err.line),
                    path,
                ));
            } else if m.empty && !(self.allow_empty_init && m.file.is_package) {
                issues.push(GateIssue::new(
                    GateIssueKind::EmptyModule,
                    format!("{} appears empty or docstring-only", m.name),
                    path,
                ));
            }
        }
        issues
    }
}

/// Analyze with default options.
pub fn analyze(repo_root: &Path, required: &[String]) -> Result<GateOutcome, RepogradeError> {
    ImportGate::new().analyze(repo_root, required)
}

fn required_file_issues(repo_root: &Path, required: &[String]) -> Vec<GateIssue> {
    let mut issues = Vec::new();
    for rf in required {
        let rel = PathBuf::from(rf.trim_start_matches(['/', '\\']));
        let full = repo_root.join(&rel);
        if !full.exists() {
            issues.push(GateIssue::new(
                GateIssueKind::MissingRequiredFile,
                format!("Missing required file: {rf}"),
                Some(rel),
            ));
        } else if full.is_file() && rel.extension().is_some_and(|e| e == "py") {
            let text = module::read_source(&full);
            if is_empty_source(&text) {
                issues.push(GateIssue::new(
                    GateIssueKind::EmptyRequiredFile,
                    format!("Required source file appears empty: {rf}"),
                    Some(rel),
                ));
            }
        }
    }
    issues
}

fn cross_module_issues(modules: &BTreeMap<String, ModuleInfo>, roots: &InternalRoots) -> Vec<GateIssue> {
    let mut issues = Vec::new();
    for m in modules.values() {
        let path = || Some(m.file.rel.clone());

        for target in &m.imports {
            if !modules.contains_key(target) {
                issues.push(GateIssue::new(
                    GateIssueKind::MissingModule,
                    format!("{} imports missing internal module: {target}", m.name),
                    path(),
                ));
            }
        }

        for from in &m.from_imports {
            if !roots.contains(&from.base) {
                continue;
            }
            // A missing base is already reported; a broken one provides nothing reliable.
            let Some(base) = modules.get(&from.base).filter(|b| b.syntax_error.is_none()) else {
                continue;
            };
            for sym in from.names.iter().filter(|s| s.as_str() != "*") {
                let submodule = format!("{}.{sym}", from.base);
                if base.provides.contains(sym) || modules.contains_key(&submodule) {
                    continue;
                }
                issues.push(GateIssue::new(
                    GateIssueKind::MissingSymbol,
                    format!(
                        "{}: from {b} import {sym} but {b} does not provide '{sym}'",
                        m.name,
                        b = from.base
                    ),
                    path(),
                ));
            }
        }
    }
    issues
}

fn missing_init_issues(repo_root: &Path, modules: &BTreeMap<String, ModuleInfo>) -> Vec<GateIssue> {
    let mut checked = BTreeSet::new();
    let mut issues = Vec::new();
    for name in modules.keys() {
        let parts: Vec<&str> = name.split('.').collect();
        for depth in 1..parts.len() {
            let package = parts[..depth].join(".");
            if modules.contains_key(&package) || !checked.insert(package.clone()) {
                continue;
            }
            let rel_dir: PathBuf = parts[..depth].iter().collect();
            let candidates = [rel_dir.clone(), Path::new(NESTED_SOURCE_DIR).join(&rel_dir)];
            if let Some(dir) = candidates.into_iter().find(|d| repo_root.join(d).is_dir()) {
                let init = dir.join("__init__.py");
                issues.push(GateIssue::new(
                    GateIssueKind::MissingInit,
                    format!(
                        "Missing package initializer for '{package}': {}",
                        init.to_string_lossy().replace('\\', "/")
                    ),
                    Some(init),
                ));
            }
        }
    }
    issues
}

fn cycle_issues(modules: &BTreeMap<String, ModuleInfo>) -> Vec<GateIssue> {
    let edges: BTreeMap<String, BTreeSet<String>> = modules
        .iter()
        .map(|(name, m)| (name.clone(), m.imports.clone()))
        .collect();
    import_cycles(&edges)
        .into_iter()
        .map(|members| {
            GateIssue::new(
                GateIssueKind::ImportCycle,
                format!("Potential import cycle among: {}", members.join(", ")),
                None,
            )
        })
        .collect()
}
