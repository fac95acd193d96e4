//! Fuzz target for model file loading.
//!
//! Tests that `persist::from_json` rejects arbitrary input with an error
//! and never panics, and that anything it accepts can score a point.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rcf_core::persist;

fuzz_target!(|data: &str| {
    if let Ok(forest) = persist::from_json(data) {
        let origin = vec![0.0; forest.dimensions()];
        let _ = forest.score(&origin);
    }
});
