//! The session key: established out-of-band during the streaming-request
//! handshake (out of scope for this crate), then used as both the AES key
//! and the HMAC key for the lifetime of the session.
//!
//! The upstream library is generic over key length (it forwards `keyLen` to
//! mbedtls's AES key-schedule, in bits), so both AES-128 and AES-256 session
//! keys are accepted here; spec.md's headline "AES-128-CBC" describes the
//! common case.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{CryptoError, Result};

/// A validated 16- or 32-byte session key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Validate and wrap a raw key. Accepts exactly 16 or 32 bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        match bytes.len() {
            16 | 32 => Ok(Self(bytes)),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    /// Borrow the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when this key selects AES-128 (as opposed to AES-256).
    #[must_use]
    pub fn is_aes_128(&self) -> bool {
        self.0.len() == 16
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").field("len", &self.0.len()).finish_non_exhaustive()
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SessionKey {}
