#![no_main]

use libfuzzer_sys::fuzz_target;
use repograde_config::{ConfigFormat, TaskConfigFile};

fuzz_target!(|data: &[u8]| {
    // Parsing and validation should reject bad documents, never panic.
    if let Ok(s) = std::str::from_utf8(data) {
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            if let Ok(file) = TaskConfigFile::parse(s, format) {
                let _ = file.validate(std::path::Path::new("/tasks/fuzz"));
            }
        }
        let _ = toml::from_str::<repograde_types::AnalysisConfig>(s);
    }
});
