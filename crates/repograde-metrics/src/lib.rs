//! Parsing of captured test-runner output.
//!
//! The text protocol is deliberately narrow:
//! - counts come from the runner's summary line (`collected N items`, `N passed`, ...);
//! - structured metrics come from a line `PREFIX key=value key=value ...`;
//! - individually addressable test ids are the `path::name` lines of a collect-only run.
//!
//! Scoring only sees [`TestCounts`] and metric maps, so another protocol can be plugged in
//! through [`OutputProtocol`] without touching it.

use regex::Regex;
use repograde_types::TestCounts;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static COLLECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"collected\s+(\d+)\s+items?").expect("valid regex"));
static PASSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+passed").expect("valid regex"));
static FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+failed").expect("valid regex"));
static SKIPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+skipped").expect("valid regex"));

/// How a suite's captured text is interpreted.
pub trait OutputProtocol: Send + Sync {
    fn counts(&self, output: &str) -> TestCounts;

    fn metrics(&self, output: &str, log: &str, prefix: &str) -> BTreeMap<String, f64>;

    fn case_ids(&self, output: &str) -> Vec<String>;
}

/// The pytest `-q` text protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct PytestText;

impl OutputProtocol for PytestText {
    fn counts(&self, output: &str) -> TestCounts {
        parse_counts(output)
    }

    fn metrics(&self, output: &str, log: &str, prefix: &str) -> BTreeMap<String, f64> {
        extract_metrics(output, log, prefix)
    }

    fn case_ids(&self, output: &str) -> Vec<String> {
        parse_case_ids(output)
    }
}

fn first_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Pass/fail/skip/total counts from a runner summary.
///
/// Without a `collected N` marker the total is the sum of the outcomes. Output that
/// reports nothing yet mentions `FAILED` or `ERROR` counts as one failed test.
pub fn parse_counts(output: &str) -> TestCounts {
    let passed = first_number(&PASSED, output).unwrap_or(0);
    let failed = first_number(&FAILED, output).unwrap_or(0);
    let skipped = first_number(&SKIPPED, output).unwrap_or(0);
    let mut counts = TestCounts {
        passed,
        failed,
        skipped,
        total: first_number(&COLLECTED, output).unwrap_or(0),
    };

    if counts.total == 0 {
        counts.total = counts.outcome_sum();
    }
    if counts.total == 0 && (output.contains("FAILED") || output.contains("ERROR")) {
        counts.failed = 1;
        counts.total = 1;
    }
    counts
}

fn metric_line_patterns(prefix: &str) -> [Regex; 2] {
    let p = regex::escape(prefix);
    [
        Regex::new(&format!(r"(?m)^[ \t]*{p}[ \t]+(.*)$")).expect("escaped prefix"),
        Regex::new(&format!(r"(?m){p}[ \t]+(.*)$")).expect("escaped prefix"),
    ]
}

/// Payload of the last metric line in one stream.
///
/// Lines starting with the prefix are preferred; the prefix anywhere in a line (e.g.
/// after progress dots) is the fallback.
fn last_metric_payload<'a>(text: &'a str, patterns: &[Regex; 2]) -> Option<&'a str> {
    patterns.iter().find_map(|re| {
        re.captures_iter(text)
            .filter_map(|c| c.get(1))
            .last()
            .map(|m| m.as_str())
    })
}

fn parse_pairs(payload: &str) -> BTreeMap<String, f64> {
    payload
        .split_whitespace()
        .filter_map(|token| {
            let (k, v) = token.split_once('=')?;
            if k.is_empty() {
                return None;
            }
            let v: f64 = v.parse().ok()?;
            v.is_finite().then(|| (k.to_string(), v))
        })
        .collect()
}

/// `key=value` floats from the last `prefix` line across `output` then `log`.
///
/// Malformed tokens are dropped. No matching line yields an empty map.
pub fn extract_metrics(output: &str, log: &str, prefix: &str) -> BTreeMap<String, f64> {
    if prefix.is_empty() {
        return BTreeMap::new();
    }
    let patterns = metric_line_patterns(prefix);
    let payload = last_metric_payload(output, &patterns)
        .or_else(|| last_metric_payload(log, &patterns));
    payload.map(parse_pairs).unwrap_or_default()
}

/// Test ids from a collect-only listing, de-duplicated in first-seen order.
pub fn parse_case_ids(output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.contains("::") && !line.starts_with('<'))
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}
