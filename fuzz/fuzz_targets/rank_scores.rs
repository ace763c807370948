//! Ranking utilities must terminate and stay within their ranges for arbitrary score maps,
//! NaN and infinite scores included.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

fuzz_target!(|pairs: Vec<(u8, f64, f64)>| {
    let mut a = BTreeMap::new();
    let mut b = BTreeMap::new();
    for (key, x, y) in pairs.into_iter().take(32) {
        a.insert(format!("c{key}"), x);
        b.insert(format!("c{key}"), y);
    }

    let ranks_a = repograde_stats::ranks_desc(&a);
    let n = a.len() as f64;
    let rank_sum: f64 = ranks_a.values().sum();
    assert_eq!(ranks_a.len(), a.len());
    assert!((rank_sum - n * (n + 1.0) / 2.0).abs() < 1e-6, "rank sum {rank_sum}");

    let rho = repograde_stats::spearman_rho(&ranks_a, &repograde_stats::ranks_desc(&b));
    assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&rho), "rho={rho}");

    let flips = repograde_stats::pairwise_flip_rate(&a, &b);
    assert!((0.0..=1.0).contains(&flips), "flips={flips}");

    if let Some(top) = repograde_stats::top1(&a) {
        assert!(a.contains_key(&top));
    }
});
