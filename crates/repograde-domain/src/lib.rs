//! Scoring logic for repograde.
//!
//! This crate is intentionally I/O-free: it turns suite results and baselines into numbers.
//! Every score lands in `[0, 1]` and carries the inputs it was computed from.

use repograde_types::{
    BaselineEntry, ScoreBasis, ScoreInputs, ScoreRecord, ScoreWeights, SuiteKind, SuiteResult,
    SuiteScore, keys,
};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DomainError {
    #[error("weight for {kind} must be a finite non-negative number, got {weight}")]
    InvalidWeight { kind: SuiteKind, weight: f64 },

    #[error("{0} is scored on its own and cannot carry a non-functional weight")]
    FunctionalWeight(SuiteKind),
}

/// Saturating compression `r / (1 + r)`: 0 at 0, 0.5 at parity, approaching 1.
pub fn compress_ratio(r: f64) -> f64 {
    if r.is_nan() || r <= 0.0 {
        return 0.0;
    }
    if r.is_infinite() {
        return 1.0;
    }
    unit(r / (1.0 + r))
}

/// Clamp to `[0, 1]`; NaN becomes 0.
fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

fn positive(x: Option<f64>) -> Option<f64> {
    x.filter(|v| *v > 0.0)
}

fn capped_ratio(numerator: f64, denominator: f64) -> f64 {
    unit(numerator / denominator)
}

fn inputs(result: &SuiteResult, baseline: &BaselineEntry, basis: ScoreBasis) -> ScoreInputs {
    ScoreInputs {
        passed: result.counts.passed,
        failed: result.counts.failed,
        total: result.counts.total,
        returncode: result.returncode,
        timed_out: result.timed_out,
        failed_suite: result.is_failed(),
        baseline_keys: baseline.keys(),
        basis,
    }
}

fn pass_ratio(result: &SuiteResult) -> f64 {
    let c = &result.counts;
    if c.total == 0 {
        0.0
    } else {
        unit(f64::from(c.passed) / f64::from(c.total))
    }
}

fn security(baseline: Option<f64>, generated: Option<f64>) -> f64 {
    match (baseline, generated) {
        (Some(b), Some(g)) if b >= 0.0 && g >= 0.0 => {
            if b == 0.0 && g == 0.0 {
                1.0
            } else {
                capped_ratio(b + 1.0, g + 1.0)
            }
        }
        _ => 0.0,
    }
}

fn maintainability(baseline: Option<f64>, generated: Option<f64>) -> (f64, Option<f64>) {
    match (baseline, generated) {
        (Some(b), Some(g)) if b > 0.0 && g >= 0.0 => {
            let ratio = g / b;
            (compress_ratio(ratio), Some(ratio))
        }
        _ => (0.0, None),
    }
}

fn footprint(
    failed: bool,
    baseline_mem: Option<f64>,
    actual_mem: Option<f64>,
    baseline_cpu: Option<f64>,
    actual_cpu: Option<f64>,
) -> (f64, bool) {
    if failed {
        return (0.0, false);
    }
    let (Some(bm), Some(am)) = (positive(baseline_mem), positive(actual_mem)) else {
        return (0.0, false);
    };
    let mem = capped_ratio(bm, am);
    match (positive(baseline_cpu), positive(actual_cpu)) {
        (Some(bc), Some(ac)) => ((mem + capped_ratio(bc, ac)) / 2.0, true),
        _ => (mem, false),
    }
}

/// Score one suite run against the baseline for its kind.
pub fn score_suite(kind: SuiteKind, result: &SuiteResult, baseline: &BaselineEntry) -> SuiteScore {
    let failed = result.is_failed();
    let (score, basis) = match kind {
        SuiteKind::Functional | SuiteKind::Robustness => (pass_ratio(result), ScoreBasis::PassRatio),
        SuiteKind::Security => {
            let b = baseline.get(keys::HIGH_RISK_COUNT);
            let g = result.metrics.get(keys::HIGH_RISK_COUNT).copied();
            (
                security(b, g),
                ScoreBasis::HighRiskCount {
                    baseline: b,
                    generated: g,
                },
            )
        }
        SuiteKind::Maintainability => {
            let b = baseline.get(keys::MI_MIN);
            let g = result.metrics.get(keys::MI_MIN).copied();
            let (score, ratio) = maintainability(b, g);
            (
                score,
                ScoreBasis::MaintainabilityIndex {
                    baseline: b,
                    generated: g,
                    ratio,
                },
            )
        }
        SuiteKind::Performance => {
            let b = baseline.get(keys::PERFORMANCE_SUITE_TIME_S);
            let a = Some(result.elapsed_s);
            let score = match (positive(b), positive(a)) {
                (Some(b), Some(a)) if !failed => capped_ratio(b, a),
                _ => 0.0,
            };
            (
                score,
                ScoreBasis::SuiteTime {
                    baseline_s: b,
                    actual_s: a,
                },
            )
        }
        SuiteKind::Resource => {
            let bm = baseline.get(keys::AVG_MEMORY_MB);
            let bc = baseline.get(keys::AVG_CPU_PERCENT);
            let am = Some(result.avg_memory_mb);
            let ac = Some(result.avg_cpu_percent);
            let (score, cpu_used) = footprint(failed, bm, am, bc, ac);
            (
                score,
                ScoreBasis::Footprint {
                    baseline_memory_mb: bm,
                    actual_memory_mb: am,
                    baseline_cpu_percent: bc,
                    actual_cpu_percent: ac,
                    cpu_used,
                },
            )
        }
    };

    SuiteScore {
        kind,
        score: unit(score),
        inputs: inputs(result, baseline, basis),
    }
}

/// A zero score for a suite that was never executed (missing test file, failed gate).
pub fn not_run_score(
    kind: SuiteKind,
    result: &SuiteResult,
    baseline: &BaselineEntry,
    reason: impl Into<String>,
) -> SuiteScore {
    SuiteScore {
        kind,
        score: 0.0,
        inputs: inputs(
            result,
            baseline,
            ScoreBasis::NotRun {
                reason: reason.into(),
            },
        ),
    }
}

pub fn validate_weights(weights: &ScoreWeights) -> Result<(), DomainError> {
    for (&kind, &weight) in &weights.0 {
        if !kind.is_non_functional() {
            return Err(DomainError::FunctionalWeight(kind));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(DomainError::InvalidWeight { kind, weight });
        }
    }
    Ok(())
}

/// Weighted mean of the given subscores. Kinds missing from `subscores` drop out of both
/// numerator and denominator; 0 when nothing carries weight.
pub fn weighted_non_functional(subscores: &BTreeMap<SuiteKind, f64>, weights: &ScoreWeights) -> f64 {
    let (num, den) = subscores
        .iter()
        .filter(|(k, _)| k.is_non_functional())
        .fold((0.0, 0.0), |(num, den), (&k, &s)| {
            let w = weights.get(k);
            (num + w * s, den + w)
        });
    if den > 0.0 { unit(num / den) } else { 0.0 }
}

/// Build the aggregate record from a functional score and the present non-functional subscores.
pub fn aggregate(
    functional: f64,
    subscores: BTreeMap<SuiteKind, f64>,
    weights: &ScoreWeights,
) -> Result<ScoreRecord, DomainError> {
    validate_weights(weights)?;
    let subscores: BTreeMap<SuiteKind, f64> = subscores
        .into_iter()
        .filter(|(k, _)| k.is_non_functional())
        .map(|(k, s)| (k, unit(s)))
        .collect();
    let applied = subscores.keys().map(|&k| (k, weights.get(k))).collect();
    Ok(ScoreRecord {
        functional_score: unit(functional),
        non_functional_score: weighted_non_functional(&subscores, weights),
        subscores,
        weights: applied,
    })
}

/// Aggregate a set of per-suite scores. A missing functional suite scores 0.
pub fn aggregate_scores<'a>(
    scores: impl IntoIterator<Item = &'a SuiteScore>,
    weights: &ScoreWeights,
) -> Result<ScoreRecord, DomainError> {
    let mut functional = 0.0;
    let mut subscores = BTreeMap::new();
    for s in scores {
        if s.kind == SuiteKind::Functional {
            functional = s.score;
        } else {
            subscores.insert(s.kind, s.score);
        }
    }
    aggregate(functional, subscores, weights)
}

/// All-zero record over the given kinds, used when the import gate rejects a candidate.
pub fn zero_record(
    kinds: impl IntoIterator<Item = SuiteKind>,
    weights: &ScoreWeights,
) -> Result<ScoreRecord, DomainError> {
    let subscores = kinds
        .into_iter()
        .filter(|k| k.is_non_functional())
        .map(|k| (k, 0.0))
        .collect();
    aggregate(0.0, subscores, weights)
}
