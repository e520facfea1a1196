//! Fuzz target for Frame::reassemble
//!
//! Splits the input into chunks, parses each as a standalone `Packet`, and
//! feeds whatever parses cleanly into reassembly in that order. Exercises
//! out-of-order fragments, missing heads, and duplicate packet ids.
//!
//! The fuzzer should NEVER panic. Malformed or incomplete fragment sets
//! should just return `None`.

#![no_main]

use ihs_proto::{Frame, Packet};
use libfuzzer_sys::fuzz_target;

const CHUNK: usize = 32;

fuzz_target!(|data: &[u8]| {
    let fragments: Vec<Packet> = data.chunks(CHUNK).filter_map(|chunk| Packet::parse(chunk).ok()).collect();
    let _ = Frame::reassemble(&fragments);
});
