//! Fuzz target for command-line record matching.

#![no_main]

use arbitrary::Arbitrary;
use fa_core::collect::record_matches;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    record: Vec<u8>,
    pattern: Vec<u8>,
    length: u16,
}

fuzz_target!(|input: Input| {
    let length = usize::from(input.length);
    let matched = record_matches(&input.record, &input.pattern, length);
    if matched {
        assert!(length > 0 && input.record.len() >= length);
    }
});
