//! Statistics for repograde.
//!
//! Everything here is total: empty inputs produce zeros rather than errors, because the
//! callers aggregate over runs that may legitimately have produced nothing.

pub mod ranking;

pub use ranking::{pairwise_flip_rate, ranks_desc, spearman_rho, top1};

use repograde_types::MetricSummary;
use statrs::statistics::Statistics;

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation; 0 for fewer than two values.
pub fn pstdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is a fraction in `[0, 1]`; out-of-range values are clamped.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.len() == 1 {
        return sorted[0];
    }
    let k = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = k.floor() as usize;
    let hi = k.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (k - lo as f64)
}

/// Coefficient of variation; 0 when the mean is 0.
pub fn coefficient_of_variation(mean: f64, std: f64) -> f64 {
    if mean == 0.0 { 0.0 } else { std / mean }
}

pub fn summarize_series(values: &[f64]) -> MetricSummary {
    let m = mean(values);
    let s = pstdev(values);
    MetricSummary {
        mean: m,
        std: s,
        cv: coefficient_of_variation(m, s),
        p05: percentile(values, 0.05),
        p95: percentile(values, 0.95),
    }
}
