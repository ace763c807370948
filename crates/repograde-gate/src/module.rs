//! Per-file static summary: provided names, imports, emptiness.

use crate::discover::SourceFile;
use regex::Regex;
use rustpython_parser::ast::{Constant, ExceptHandler, Expr, Mod, Stmt, StmtImportFrom};
use rustpython_parser::{Mode, parse};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)#.*$").expect("valid regex"));

/// Root names that are never treated as internal, even if the repository shadows them.
const STDLIB_ROOTS: &[&str] = &[
    "argparse", "asyncio", "base64", "collections", "csv", "dataclasses", "decimal", "doctest",
    "email", "fractions", "functools", "hashlib", "http", "importlib", "itertools", "json",
    "logging", "math", "os", "pathlib", "pickle", "re", "statistics", "subprocess", "sys",
    "threading", "time", "typing", "unittest", "urllib", "xml",
];

pub fn root_segment(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

/// Top-level package names owned by the repository.
#[derive(Debug, Clone, Default)]
pub struct InternalRoots(BTreeSet<String>);

impl InternalRoots {
    pub fn from_modules<'a>(modules: impl IntoIterator<Item = &'a String>) -> Self {
        Self(modules.into_iter().map(|m| root_segment(m).to_string()).collect())
    }

    pub fn contains(&self, target: &str) -> bool {
        let root = root_segment(target);
        self.0.contains(root) && !STDLIB_ROOTS.contains(&root)
    }
}

/// Resolve the module named by an import.
///
/// Relative imports drop `level` trailing segments from the importer's dotted name (one
/// fewer for a package initializer, whose name already is the package) and append `module`.
pub fn resolve_import(
    importer: &str,
    is_package: bool,
    level: u32,
    module: Option<&str>,
) -> Option<String> {
    if level == 0 {
        return module.filter(|m| !m.is_empty()).map(str::to_string);
    }
    let mut parts: Vec<&str> = importer.split('.').collect();
    let strip = (if is_package { level - 1 } else { level }) as usize;
    if strip > parts.len() {
        return None;
    }
    parts.truncate(parts.len() - strip);
    if let Some(m) = module {
        parts.extend(m.split('.'));
    }
    let joined = parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    (!joined.is_empty()).then_some(joined)
}

/// A top-level `from <base> import <names>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromImport {
    pub base: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxProblem {
    pub message: String,
    pub line: usize,
}

/// Static summary of one module file.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub file: SourceFile,

    /// Names bound at module level.
    pub provides: BTreeSet<String>,

    /// Internal modules imported anywhere in the file.
    pub imports: BTreeSet<String>,

    pub from_imports: Vec<FromImport>,
    pub syntax_error: Option<SyntaxProblem>,
    pub empty: bool,
}

impl ModuleInfo {
    pub fn load(name: String, file: SourceFile, roots: &InternalRoots) -> Self {
        let text = read_source(&file.path);
        Self::from_source(name, file, &text, roots)
    }

    pub fn from_source(name: String, file: SourceFile, text: &str, roots: &InternalRoots) -> Self {
        let mut info = ModuleInfo {
            name,
            file,
            provides: BTreeSet::new(),
            imports: BTreeSet::new(),
            from_imports: Vec::new(),
            syntax_error: None,
            empty: false,
        };

        let body = match parse_body(text, &info.file.path) {
            Ok(body) => body,
            Err(problem) => {
                info.syntax_error = Some(problem);
                return info;
            }
        };

        let resolve = |s: &StmtImportFrom| {
            let level = s.level.as_ref().map_or(0, |l| l.to_u32());
            resolve_import(
                &info.name,
                info.file.is_package,
                level,
                s.module.as_ref().map(|m| m.as_str()),
            )
        };

        let mut imported = BTreeSet::new();
        collect_imports(&body, &resolve, &mut imported);
        let from_imports: Vec<FromImport> = body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::ImportFrom(s) => resolve(s).map(|base| FromImport {
                    base,
                    names: s.names.iter().map(|a| a.name.as_str().to_string()).collect(),
                }),
                _ => None,
            })
            .collect();

        info.imports = imported.into_iter().filter(|m| roots.contains(m)).collect();
        info.from_imports = from_imports;
        collect_provides(&body, &mut info.provides);
        info.empty = text_is_blank(text) || body_is_trivial(&body);
        info
    }
}

pub fn read_source(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read source file");
            String::new()
        }
    }
}

fn parse_body(text: &str, path: &Path) -> Result<Vec<Stmt>, SyntaxProblem> {
    match parse(text, Mode::Module, &path.to_string_lossy()) {
        Ok(Mod::Module(m)) => Ok(m.body),
        Ok(_) => Ok(Vec::new()),
        Err(err) => {
            let offset = (u32::from(err.offset) as usize).min(text.len());
            let line = text.as_bytes()[..offset].iter().filter(|b| **b == b'\n').count() + 1;
            Err(SyntaxProblem {
                message: err.error.to_string(),
                line,
            })
        }
    }
}

/// Statement blocks nested directly inside `stmt`.
fn blocks(stmt: &Stmt) -> Vec<&[Stmt]> {
    fn handlers(hs: &[ExceptHandler]) -> impl Iterator<Item = &[Stmt]> {
        hs.iter().map(|h| {
            let ExceptHandler::ExceptHandler(h) = h;
            h.body.as_slice()
        })
    }

    match stmt {
        Stmt::FunctionDef(s) => vec![s.body.as_slice()],
        Stmt::AsyncFunctionDef(s) => vec![s.body.as_slice()],
        Stmt::ClassDef(s) => vec![s.body.as_slice()],
        Stmt::For(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::AsyncFor(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::While(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::If(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::With(s) => vec![s.body.as_slice()],
        Stmt::AsyncWith(s) => vec![s.body.as_slice()],
        Stmt::Try(s) => [s.body.as_slice(), s.orelse.as_slice(), s.finalbody.as_slice()]
            .into_iter()
            .chain(handlers(&s.handlers))
            .collect(),
        Stmt::TryStar(s) => [s.body.as_slice(), s.orelse.as_slice(), s.finalbody.as_slice()]
            .into_iter()
            .chain(handlers(&s.handlers))
            .collect(),
        Stmt::Match(s) => s.cases.iter().map(|c| c.body.as_slice()).collect(),
        _ => Vec::new(),
    }
}

/// Whether a block binds its names in the enclosing (module) scope.
fn shares_scope(stmt: &Stmt) -> bool {
    !matches!(
        stmt,
        Stmt::FunctionDef(_) | Stmt::AsyncFunctionDef(_) | Stmt::ClassDef(_)
    )
}

fn collect_imports(
    body: &[Stmt],
    resolve: &dyn Fn(&StmtImportFrom) -> Option<String>,
    out: &mut BTreeSet<String>,
) {
    for stmt in body {
        match stmt {
            Stmt::Import(s) => out.extend(s.names.iter().map(|a| a.name.as_str().to_string())),
            Stmt::ImportFrom(s) => out.extend(resolve(s)),
            other => {
                for block in blocks(other) {
                    collect_imports(block, resolve, out);
                }
            }
        }
    }
}

fn bind_target(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Name(n) => {
            out.insert(n.id.as_str().to_string());
        }
        Expr::Tuple(t) => t.elts.iter().for_each(|e| bind_target(e, out)),
        Expr::List(l) => l.elts.iter().for_each(|e| bind_target(e, out)),
        Expr::Starred(s) => bind_target(&s.value, out),
        _ => {}
    }
}

fn collect_provides(body: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::FunctionDef(s) => {
                out.insert(s.name.as_str().to_string());
            }
            Stmt::AsyncFunctionDef(s) => {
                out.insert(s.name.as_str().to_string());
            }
            Stmt::ClassDef(s) => {
                out.insert(s.name.as_str().to_string());
            }
            Stmt::Assign(s) => s.targets.iter().for_each(|t| bind_target(t, out)),
            Stmt::AnnAssign(s) => bind_target(&s.target, out),
            Stmt::ImportFrom(s) => {
                for a in &s.names {
                    if a.name.as_str() != "*" {
                        let bound = a.asname.as_ref().unwrap_or(&a.name);
                        out.insert(bound.as_str().to_string());
                    }
                }
            }
            Stmt::Import(s) => {
                for a in &s.names {
                    let bound = match &a.asname {
                        Some(alias) => alias.as_str(),
                        None => root_segment(a.name.as_str()),
                    };
                    out.insert(bound.to_string());
                }
            }
            other if shares_scope(other) => {
                for block in blocks(other) {
                    collect_provides(block, out);
                }
            }
            _ => {}
        }
    }
}

pub fn text_is_blank(text: &str) -> bool {
    COMMENT.replace_all(text, "").trim().is_empty()
}

/// Only docstrings, `...` and `pass`.
fn body_is_trivial(body: &[Stmt]) -> bool {
    body.iter().all(|stmt| match stmt {
        Stmt::Pass(_) => true,
        Stmt::Expr(e) => matches!(
            &*e.value,
            Expr::Constant(c) if matches!(c.value, Constant::Str(_) | Constant::Ellipsis)
        ),
        _ => false,
    })
}

/// Emptiness test for arbitrary source text: blank after removing comments, or a body
/// of docstrings and no-ops. Unparseable text is not empty.
pub fn is_empty_source(text: &str) -> bool {
    if text_is_blank(text) {
        return true;
    }
    parse_body(text, Path::new("<required>")).is_ok_and(|body| body_is_trivial(&body))
}
