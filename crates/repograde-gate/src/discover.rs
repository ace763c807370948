//! Source file discovery and dotted module naming.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Nested source subtree whose files map to top-level modules.
pub const NESTED_SOURCE_DIR: &str = "src";

const SKIPPED_DIRS: [&str; 2] = ["__pycache__", "node_modules"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,

    /// Location relative to the repository root.
    pub rel: PathBuf,

    /// The file is a package initializer (`__init__.py`).
    pub is_package: bool,
}

/// Dotted module name of `file` relative to `base`; `None` for a root-level initializer.
pub fn module_name(base: &Path, file: &Path) -> Option<(String, bool)> {
    let rel = file.strip_prefix(base).ok()?;
    let mut parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let last = parts.pop()?;
    let stem = last.strip_suffix(".py")?;
    let is_package = stem == "__init__";
    if !is_package {
        parts.push(stem.to_string());
    }
    if parts.is_empty() {
        return None;
    }
    Some((parts.join("."), is_package))
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn walk(base: &Path, repo_root: &Path, exclude: Option<&Path>, out: &mut BTreeMap<String, SourceFile>) {
    let walker = WalkDir::new(base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e) && exclude.is_none_or(|x| e.path() != x));

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() || entry.path().extension() != Some(OsStr::new("py")) {
            continue;
        }
        let Some((name, is_package)) = module_name(base, entry.path()) else {
            continue;
        };
        let rel = entry
            .path()
            .strip_prefix(repo_root)
            .unwrap_or(entry.path())
            .to_path_buf();
        out.insert(
            name,
            SourceFile {
                path: entry.path().to_path_buf(),
                rel,
                is_package,
            },
        );
    }
}

/// Every source module of the repository, keyed by dotted name.
///
/// Files under the nested source subtree are named relative to it and win over a
/// same-named module from the flat layout.
pub fn discover(repo_root: &Path) -> BTreeMap<String, SourceFile> {
    let nested = repo_root.join(NESTED_SOURCE_DIR);
    let nested = nested.is_dir().then_some(nested);

    let mut modules = BTreeMap::new();
    walk(repo_root, repo_root, nested.as_deref(), &mut modules);
    if let Some(src) = &nested {
        walk(src, repo_root, None, &mut modules);
    }
    modules
}
