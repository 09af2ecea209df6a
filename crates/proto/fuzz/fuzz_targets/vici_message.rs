//! Fuzz target for VICI message decoding.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run vici_message -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use swanmon_proto::vici::{decode, Message, Packet};

fuzz_target!(|data: &[u8]| {
    let _ = Packet::from_bytes(data);

    if let Ok(message) = Message::from_bytes(data) {
        let _ = decode::stats(&message);
        let _ = decode::pools(&message);
        let _ = decode::ike_sas(&message);

        // Anything decoded must encode and decode to the same message
        if let Ok(bytes) = message.to_bytes() {
            let reparsed = Message::from_bytes(&bytes).expect("re-encoded message should decode");
            assert_eq!(message, reparsed);
        }
    }
});
