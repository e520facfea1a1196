//! Crypto error taxonomy.

use thiserror::Error;

/// Errors raised by frame encryption, decryption, or key validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The session key was neither 16 bytes (AES-128) nor 32 bytes (AES-256).
    #[error("invalid session key length: expected 16 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// AES-CBC PKCS#7 unpadding failed: corrupt ciphertext or wrong key.
    #[error("AES-CBC PKCS#7 padding invalid")]
    PaddingInvalid,

    /// Ciphertext was shorter than the mandatory 16-byte IV prefix.
    #[error("ciphertext too short for a 16-byte IV prefix: got {0} bytes")]
    CiphertextTooShort(usize),
}

/// Convenience alias for crypto-crate results.
pub type Result<T> = std::result::Result<T, CryptoError>;
