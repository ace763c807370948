#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let counts = repograde_metrics::parse_counts(&text);
    if counts.failed > 0 {
        assert!(counts.total >= 1, "failed suite without tests for {text:?}");
    }
});
