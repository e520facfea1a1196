//! Cryptographic primitives for the Steam In-Home Streaming session
//! protocol: per-message frame encryption (AES-CBC with an
//! HMAC-MD5-derived IV and a strictly increasing sequence number), the
//! authentication-request token (HMAC-SHA-256), and zero-IV video-partial
//! decryption.
//!
//! This crate has no knowledge of the wire framing that carries these
//! bytes (that's `ihs-proto`) or of session state (`ihs-core`).

mod aes_cbc;
pub mod auth;
pub mod errors;
pub mod frame;
mod key;
pub mod video;

pub use auth::authentication_token;
pub use errors::{CryptoError, Result};
pub use frame::DecryptOutcome;
pub use key::SessionKey;
