//! Every suite score stays in [0, 1] whatever the measurements and baselines are.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use repograde_types::{BaselineEntry, SuiteKind, SuiteResult, TestCounts, keys};

#[derive(Arbitrary, Debug)]
struct Input {
    kind: u8,
    passed: u16,
    failed: u16,
    returncode: i32,
    elapsed_s: f64,
    memory_mb: f64,
    cpu_percent: f64,
    metric: f64,
    baseline: f64,
    baseline_cpu: f64,
}

fuzz_target!(|input: Input| {
    let kind = SuiteKind::ALL[usize::from(input.kind) % SuiteKind::ALL.len()];
    let passed = u32::from(input.passed);
    let failed = u32::from(input.failed);
    let mut result = SuiteResult::not_run("fuzz");
    result.counts = TestCounts {
        passed,
        failed,
        skipped: 0,
        total: passed + failed,
    };
    result.error = None;
    result.returncode = input.returncode;
    result.elapsed_s = input.elapsed_s;
    result.avg_memory_mb = input.memory_mb;
    result.avg_cpu_percent = input.cpu_percent;
    result.metrics.insert(keys::HIGH_RISK_COUNT.to_string(), input.metric);
    result.metrics.insert(keys::MI_MIN.to_string(), input.metric);
    result.enforce_failure_floor();

    let mut baseline = BaselineEntry::default();
    for key in [
        keys::HIGH_RISK_COUNT,
        keys::MI_MIN,
        keys::PERFORMANCE_SUITE_TIME_S,
        keys::AVG_MEMORY_MB,
    ] {
        baseline.values.insert(key.to_string(), input.baseline);
    }
    baseline
        .values
        .insert(keys::AVG_CPU_PERCENT.to_string(), input.baseline_cpu);

    let score = repograde_domain::score_suite(kind, &result, &baseline);
    assert!((0.0..=1.0).contains(&score.score), "{kind}: {score:?}");
});
