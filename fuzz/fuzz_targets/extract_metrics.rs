#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (output, log) = data;
    for prefix in ["SECURITY_METRICS", "MAINT_METRICS"] {
        let metrics = repograde_metrics::extract_metrics(output, log, prefix);
        assert!(metrics.values().all(|v| v.is_finite()));
    }
    let _ = repograde_metrics::parse_case_ids(output);
});
