//! Rank-stability measures over candidate score maps.
//!
//! Keys are candidate identifiers. Higher scores rank better (rank 1).

use std::collections::BTreeMap;

fn ordered(values: &BTreeMap<String, f64>) -> Vec<(&String, f64)> {
    let mut items: Vec<(&String, f64)> = values.iter().map(|(k, v)| (k, *v)).collect();
    items.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    items
}

/// Rank descending by score; tied candidates share the average of the positions they span.
pub fn ranks_desc(values: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let items = ordered(values);
    let mut ranks = BTreeMap::new();
    let mut i = 0;
    while i < items.len() {
        let mut j = i;
        while j < items.len() && same_score(items[j].1, items[i].1) {
            j += 1;
        }
        // positions i+1 ..= j
        let avg = (i + 1 + j) as f64 / 2.0;
        for (key, _) in &items[i..j] {
            ranks.insert((*key).clone(), avg);
        }
        i = j;
    }
    ranks
}

/// Equal scores tie, and so do NaNs with identical bits.
fn same_score(a: f64, b: f64) -> bool {
    a == b || a.total_cmp(&b).is_eq()
}

/// Pearson correlation of two rank maps over their common keys.
///
/// Defined as 1.0 when fewer than two keys are shared or either side has no spread.
pub fn spearman_rho(rank_a: &BTreeMap<String, f64>, rank_b: &BTreeMap<String, f64>) -> f64 {
    let shared: Vec<(f64, f64)> = rank_a
        .iter()
        .filter_map(|(k, a)| rank_b.get(k).map(|b| (*a, *b)))
        .collect();
    let n = shared.len();
    if n < 2 {
        return 1.0;
    }
    let ma = shared.iter().map(|(a, _)| a).sum::<f64>() / n as f64;
    let mb = shared.iter().map(|(_, b)| b).sum::<f64>() / n as f64;
    let num: f64 = shared.iter().map(|(a, b)| (a - ma) * (b - mb)).sum();
    let den_a = shared.iter().map(|(a, _)| (a - ma).powi(2)).sum::<f64>().sqrt();
    let den_b = shared.iter().map(|(_, b)| (b - mb).powi(2)).sum::<f64>().sqrt();
    if den_a == 0.0 || den_b == 0.0 {
        return 1.0;
    }
    num / (den_a * den_b)
}

/// Highest-scoring candidate; ties go to the candidate that ranks first in [`ranks_desc`].
pub fn top1(values: &BTreeMap<String, f64>) -> Option<String> {
    ordered(values).first().map(|(k, _)| (*k).clone())
}

/// Fraction of candidate pairs whose relative order differs between two score maps.
///
/// Pairs tied in either map are left out of the denominator; 0 when nothing is comparable.
pub fn pairwise_flip_rate(reference: &BTreeMap<String, f64>, other: &BTreeMap<String, f64>) -> f64 {
    let keys: Vec<&String> = reference.keys().filter(|k| other.contains_key(*k)).collect();
    let mut flips = 0usize;
    let mut compared = 0usize;
    for (i, a) in keys.iter().enumerate() {
        for b in &keys[i + 1..] {
            let d_ref = reference[*a] - reference[*b];
            let d_new = other[*a] - other[*b];
            if d_ref == 0.0 || d_new == 0.0 {
                continue;
            }
            compared += 1;
            if (d_ref > 0.0) != (d_new > 0.0) {
                flips += 1;
            }
        }
    }
    if compared == 0 {
        0.0
    } else {
        flips as f64 / compared as f64
    }
}
