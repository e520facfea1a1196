//! Fuzz target for Packet::parse
//!
//! Exercises the 13-byte header layout, the CRC-32C trailer check, and the
//! zerocopy cast against arbitrary byte sequences.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use ihs_proto::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Packet::parse(data);
});
