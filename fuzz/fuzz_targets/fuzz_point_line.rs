//! Fuzz target for CLI point parsing.
//!
//! Tests that `parse_line` handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rcf_core::input::parse_line;

fuzz_target!(|data: &str| {
    // Malformed lines are errors, never panics
    let _ = parse_line(data, 1);
});
