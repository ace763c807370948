//! Human-readable gate output and source excerpts for a repair loop.

use repograde_types::{GateIssue, GateOutcome};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

pub const DEFAULT_MAX_REPORT_ITEMS: usize = 200;
pub const DEFAULT_CONTEXT_FILES: usize = 25;
pub const DEFAULT_CONTEXT_CHARS: usize = 1600;

/// Report grouped by kind, then the numbered issue list (at most `max_items` lines).
pub fn format_gate_report(issues: &[GateIssue], max_items: usize) -> String {
    if issues.is_empty() {
        return "Import gate: OK (no issues)\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Import gate: FAIL ({} issues)", issues.len());
    let outcome = GateOutcome::from_issues(issues.to_vec());
    for (kind, n) in outcome.counts_by_kind() {
        let _ = writeln!(out, "  {kind}: {n}");
    }
    out.push('\n');

    for (i, issue) in issues.iter().take(max_items).enumerate() {
        let _ = write!(out, "{:03}. [{}] {}", i + 1, issue.kind, issue.message);
        if let Some(path) = &issue.path {
            let _ = write!(out, " @ {}", posix(path));
        }
        out.push('\n');
    }
    if issues.len() > max_items {
        let _ = writeln!(out, "... ({} more)", issues.len() - max_items);
    }
    out
}

fn posix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// `<file_context>` blocks with the head of every existing source file named by an issue.
pub fn collect_issue_context(
    repo_root: &Path,
    issues: &[GateIssue],
    max_files: usize,
    max_chars: usize,
) -> String {
    let mut seen = BTreeSet::new();
    let files: Vec<&Path> = issues
        .iter()
        .filter_map(|i| i.path.as_deref())
        .filter(|p| p.extension().is_some_and(|e| e == "py"))
        .filter(|p| repo_root.join(p).is_file())
        .filter(|p| seen.insert(*p))
        .take(max_files)
        .collect();

    files
        .into_iter()
        .filter_map(|rel| {
            let text = std::fs::read(repo_root.join(rel)).ok()?;
            let text = String::from_utf8_lossy(&text);
            let mut excerpt: String = text.chars().take(max_chars).collect();
            if text.chars().nth(max_chars).is_some() {
                excerpt.push_str("\n... (truncated) ...\n");
            }
            Some(format!(
                "<file_context path={}>\n{excerpt}\n</file_context>",
                posix(rel)
            ))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
