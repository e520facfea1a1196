//! Fuzz target for frame::decrypt
//!
//! The key is fixed (key-schedule validity is not what's under test here);
//! arbitrary bytes stand in for an attacker-controlled `iv || ciphertext`
//! frame body. Exercises the padding check, the HMAC-derived-IV compare,
//! and the three-way sequence classification.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an
//! error or a `HashMismatch`/`OldSequence` outcome.

#![no_main]

use ihs_crypto::{SessionKey, frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    #[allow(clippy::expect_used)]
    let key = SessionKey::new(vec![0x42u8; 16]).expect("16-byte key is always valid");
    let _ = frame::decrypt(&key, data, 0);
});
