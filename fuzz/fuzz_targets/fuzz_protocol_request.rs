//! Fuzz target for command protocol decoding.
//!
//! Feeds arbitrary bytes through the framer in two chunks, then decodes
//! every completed value as a request and any `start` payload as targets.
//! Nothing here may panic; bad input is dropped.

#![no_main]

use fa_core::protocol::{parse_targets, FrameBuffer, Request};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut framer = FrameBuffer::new(4096);
    let mut frames = framer.push(&data[..split]);
    frames.extend(framer.push(&data[split..]));
    assert!(framer.pending() <= 4096);

    for value in frames.into_iter().flatten() {
        if let Ok(Request::Start(payload)) = Request::from_value(&value) {
            let _ = parse_targets(&payload);
        }
    }
});
