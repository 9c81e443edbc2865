//! Fuzz target for command-line record rendering.
//!
//! Tests that arbitrary records render without panicking and that the
//! result never contains a NUL.

#![no_main]

use fa_core::collect::to_display_string;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let rendered = to_display_string(data);
    assert!(!rendered.contains('\0'));
});
