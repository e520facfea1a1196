//! Video-partial payload decryption: AES-CBC-PKCS7 with an all-zero IV and
//! no HMAC/sequence wrapper (`Encrypted=0x20`, spec.md §4.7).

use crate::{aes_cbc, errors::Result, key::SessionKey};

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Decrypt a video partial payload encrypted with a zero IV.
pub fn decrypt_zero_iv(key: &SessionKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    aes_cbc::decrypt(key, &ZERO_IV, ciphertext)
}

/// Encrypt a payload with a zero IV (used by tests and by loopback harnesses
/// that simulate the host side).
#[must_use]
pub fn encrypt_zero_iv(key: &SessionKey, plaintext: &[u8]) -> Vec<u8> {
    aes_cbc::encrypt(key, &ZERO_IV, plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let key = SessionKey::new(vec![0x12u8; 16]).expect("valid key");
        let plaintext = b"NAL unit payload bytes";
        let ciphertext = encrypt_zero_iv(&key, plaintext);
        let decrypted = decrypt_zero_iv(&key, &ciphertext).expect("should decrypt");
        assert_eq!(decrypted, plaintext);
    }
}
