//! Fuzz target for status command output parsing.
//!
//! This fuzzer feeds arbitrary text through dialect detection, both status
//! parsers and the emitter to find:
//! - Panics on malformed lines
//! - Slicing at non-character boundaries
//! - Pathological regex behaviour
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run status_output -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use swanmon_proto::emitter::Emitter;
use swanmon_proto::status::{self, parse_status, parse_statusall};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Both parsers must accept any text, whatever the detector says
    let _ = parse_statusall(text);
    let _ = parse_status(text);

    let emission = Emitter::default().emit(&status::parse(text));
    assert!(!emission.samples.is_empty());
});
