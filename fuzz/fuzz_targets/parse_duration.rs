#![no_main]

use libfuzzer_sys::fuzz_target;
use repograde_config::TimeoutValue;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = repograde_config::parse_duration(s);
        if let Ok(d) = TimeoutValue::Text(s.to_string()).to_duration() {
            assert!(!d.is_zero(), "accepted zero timeout from {s:?}");
        }
    }
});
