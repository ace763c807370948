#![no_main]

use libfuzzer_sys::fuzz_target;
use repograde_gate::{InternalRoots, ModuleInfo, SourceFile};
use std::path::PathBuf;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let roots = InternalRoots::from_modules(&["pkg".to_string()]);
    let file = SourceFile {
        path: PathBuf::from("/repo/pkg/sub/__init__.py"),
        rel: PathBuf::from("pkg/sub/__init__.py"),
        is_package: true,
    };
    let info = ModuleInfo::from_source("pkg.sub".to_string(), file, &text, &roots);
    assert!(info.imports.iter().all(|m| roots.contains(m)));
});
