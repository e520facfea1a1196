//! Fuzz target for BroadcastDatagram::parse
//!
//! Exercises the pre-session discovery framing: magic-prefix validation
//! and the two length-prefixed sections (`BroadcastHeader`, payload).
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use ihs_proto::discovery::BroadcastDatagram;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = BroadcastDatagram::parse(data);
});
