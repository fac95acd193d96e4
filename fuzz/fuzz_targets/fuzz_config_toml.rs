//! Fuzz target for config.toml parsing.
//!
//! Tests that TOML parsing and validation handle arbitrary input without
//! panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rcf_common::Config;

fuzz_target!(|data: &str| {
    if let Ok(config) = Config::from_toml_str(data) {
        let _ = config.validate();
    }
});
